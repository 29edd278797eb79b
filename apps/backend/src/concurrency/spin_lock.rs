use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
    read_modify_write, AggregateMutation, ConcurrencyStrategy, MutationReceipt, StrategyKind,
};
use crate::config::SpinSettings;
use crate::error::AppError;
use crate::lock::LockProvider;
use crate::store::AggregateStore;

/// Polls a distributed lock at a fixed interval, then does a plain
/// read-modify-write while holding it.
pub struct SpinLockStrategy {
    store: Arc<dyn AggregateStore>,
    locks: Arc<dyn LockProvider>,
    ttl: Duration,
    settings: SpinSettings,
}

impl SpinLockStrategy {
    pub fn new(
        store: Arc<dyn AggregateStore>,
        locks: Arc<dyn LockProvider>,
        ttl: Duration,
        settings: SpinSettings,
    ) -> Self {
        Self {
            store,
            locks,
            ttl,
            settings,
        }
    }
}

pub(crate) fn spin_lock_name(key: &str) -> String {
    format!("lock:spin:{key}")
}

#[async_trait]
impl ConcurrencyStrategy for SpinLockStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SpinLock
    }

    async fn execute_with_mutation(
        &self,
        key: &str,
        mutation: &AggregateMutation,
    ) -> Result<MutationReceipt, AppError> {
        let name = spin_lock_name(key);
        let max_attempts = self.settings.max_retries.saturating_add(1);

        let mut acquired = None;
        for attempt in 1..=max_attempts {
            if let Some(handle) = self
                .locks
                .try_lock(&name, Duration::ZERO, self.settings.lease)
                .await?
            {
                acquired = Some((handle, attempt));
                break;
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.settings.interval).await;
            }
        }
        let Some((handle, attempts)) = acquired else {
            let waited = self.settings.interval * self.settings.max_retries;
            warn!(key, attempts = max_attempts, "Spin lock not acquired");
            return Err(AppError::lock_timeout(key, waited));
        };
        debug!(key, attempts, "Spin lock acquired");

        let written = read_modify_write(self.store.as_ref(), key, mutation, self.ttl).await;
        match self.locks.unlock(&handle).await {
            Ok(true) => {}
            Ok(false) => warn!(key, "Spin lock lease expired before release"),
            Err(err) => warn!(key, error = %err, "Spin lock release failed"),
        }
        written?;

        Ok(MutationReceipt {
            strategy: self.kind(),
            attempts,
        })
    }
}
