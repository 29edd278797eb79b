use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    read_modify_write, AggregateMutation, ConcurrencyStrategy, MutationReceipt, StrategyKind,
};
use crate::error::AppError;
use crate::store::AggregateStore;

/// Unprotected read-modify-write. Two writers that read the same base
/// state both write it back and one of them is silently dropped; kept as
/// the baseline the other strategies are measured against.
pub struct NoneStrategy {
    store: Arc<dyn AggregateStore>,
    ttl: Duration,
}

impl NoneStrategy {
    pub fn new(store: Arc<dyn AggregateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }
}

#[async_trait]
impl ConcurrencyStrategy for NoneStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::None
    }

    async fn execute_with_mutation(
        &self,
        key: &str,
        mutation: &AggregateMutation,
    ) -> Result<MutationReceipt, AppError> {
        read_modify_write(self.store.as_ref(), key, mutation, self.ttl).await?;
        Ok(MutationReceipt {
            strategy: self.kind(),
            attempts: 1,
        })
    }
}
