use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{
    read_modify_write, AggregateMutation, ConcurrencyStrategy, MutationReceipt, StrategyKind,
};
use crate::error::AppError;
use crate::store::AggregateStore;

/// Exclusive record lock held across the read-modify-write, released after
/// the write is acknowledged.
pub struct PessimisticStrategy {
    store: Arc<dyn AggregateStore>,
    ttl: Duration,
    wait: Duration,
}

impl PessimisticStrategy {
    pub fn new(store: Arc<dyn AggregateStore>, ttl: Duration, wait: Duration) -> Self {
        Self { store, ttl, wait }
    }
}

#[async_trait]
impl ConcurrencyStrategy for PessimisticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Pessimistic
    }

    async fn execute_with_mutation(
        &self,
        key: &str,
        mutation: &AggregateMutation,
    ) -> Result<MutationReceipt, AppError> {
        let lock = self.store.lock_for_update(key, self.wait).await?;
        let written = read_modify_write(self.store.as_ref(), key, mutation, self.ttl).await;
        if let Err(err) = lock.release().await {
            // the lease frees the row eventually
            warn!(key, error = %err, "Record lock release failed");
        }
        written?;
        Ok(MutationReceipt {
            strategy: self.kind(),
            attempts: 1,
        })
    }
}
