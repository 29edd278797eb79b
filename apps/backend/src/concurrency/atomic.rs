use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{AggregateMutation, ConcurrencyStrategy, MutationReceipt, StrategyKind};
use crate::error::AppError;
use crate::store::AggregateStore;

/// Pushes the field change itself to the store as one command. There is no
/// separate read, so there is nothing to go stale.
pub struct AtomicStrategy {
    store: Arc<dyn AggregateStore>,
    ttl: Duration,
}

impl AtomicStrategy {
    pub fn new(store: Arc<dyn AggregateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }
}

#[async_trait]
impl ConcurrencyStrategy for AtomicStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Atomic
    }

    async fn execute_with_mutation(
        &self,
        key: &str,
        mutation: &AggregateMutation,
    ) -> Result<MutationReceipt, AppError> {
        match mutation {
            AggregateMutation::Upsert { field, value } => {
                self.store.upsert_field(key, field, value, self.ttl).await?
            }
            AggregateMutation::Remove { field } => self.store.remove_field(key, field).await?,
        }
        Ok(MutationReceipt {
            strategy: self.kind(),
            attempts: 1,
        })
    }
}
