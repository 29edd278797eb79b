use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{
    read_modify_write, AggregateMutation, ConcurrencyStrategy, MutationReceipt, StrategyKind,
};
use crate::error::AppError;
use crate::store::AggregateStore;

/// Per-key async mutex. Correct only while every writer lives in this
/// process and goes through this instance.
pub struct InProcessStrategy {
    store: Arc<dyn AggregateStore>,
    ttl: Duration,
    wait: Duration,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InProcessStrategy {
    pub fn new(store: Arc<dyn AggregateStore>, ttl: Duration, wait: Duration) -> Self {
        Self {
            store,
            ttl,
            wait,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the mutex for `key` once nobody holds or awaits it.
    fn forget_idle(&self, key: &str) {
        self.locks
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[async_trait]
impl ConcurrencyStrategy for InProcessStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::InProcess
    }

    async fn execute_with_mutation(
        &self,
        key: &str,
        mutation: &AggregateMutation,
    ) -> Result<MutationReceipt, AppError> {
        let mutex = self.lock_for(key);
        let acquired = tokio::time::timeout(self.wait, mutex.clone().lock_owned()).await;
        drop(mutex);
        let Ok(guard) = acquired else {
            self.forget_idle(key);
            return Err(AppError::lock_timeout(key, self.wait));
        };
        let written = read_modify_write(self.store.as_ref(), key, mutation, self.ttl).await;
        drop(guard);
        self.forget_idle(key);
        written?;
        Ok(MutationReceipt {
            strategy: self.kind(),
            attempts: 1,
        })
    }
}
