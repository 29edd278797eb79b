use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{AggregateMutation, ConcurrencyStrategy, MutationReceipt, StrategyKind};
use crate::error::AppError;
use crate::lock::{LeaseWatchdog, LockProvider};
use crate::store::AggregateStore;

/// Blocks on a distributed lock until released (woken by the provider's
/// release notification), bounded by `wait`. A watchdog renews the lease
/// while the holder works, so a slow write does not hand the lock to the
/// next waiter early.
pub struct WaitQueueStrategy {
    store: Arc<dyn AggregateStore>,
    locks: Arc<dyn LockProvider>,
    ttl: Duration,
    wait: Duration,
    lease: Duration,
}

impl WaitQueueStrategy {
    pub fn new(
        store: Arc<dyn AggregateStore>,
        locks: Arc<dyn LockProvider>,
        ttl: Duration,
        wait: Duration,
        lease: Duration,
    ) -> Self {
        Self {
            store,
            locks,
            ttl,
            wait,
            lease,
        }
    }
}

impl WaitQueueStrategy {
    /// Read-modify-write that refuses to commit once the lease is gone.
    async fn commit(
        &self,
        key: &str,
        mutation: &AggregateMutation,
        watchdog: &LeaseWatchdog,
    ) -> Result<u64, AppError> {
        let current = self.store.load(key).await?;
        let mut aggregate = current.value;
        mutation.apply(&mut aggregate);
        if watchdog.lease_lost() {
            warn!(key, "Lease lost mid-update; write abandoned");
            return Err(AppError::lock_timeout(key, self.wait));
        }
        self.store.store(key, &aggregate, self.ttl).await
    }
}

pub(crate) fn queue_lock_name(key: &str) -> String {
    format!("lock:queue:{key}")
}

#[async_trait]
impl ConcurrencyStrategy for WaitQueueStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::WaitQueue
    }

    async fn execute_with_mutation(
        &self,
        key: &str,
        mutation: &AggregateMutation,
    ) -> Result<MutationReceipt, AppError> {
        let name = queue_lock_name(key);
        let Some(handle) = self.locks.try_lock(&name, self.wait, self.lease).await? else {
            warn!(key, wait_ms = self.wait.as_millis(), "Wait-queue lock not acquired");
            return Err(AppError::lock_timeout(key, self.wait));
        };
        let watchdog = LeaseWatchdog::start(self.locks.clone(), handle.clone(), self.lease);

        let written = self.commit(key, mutation, &watchdog).await;

        // the write is acknowledged before anyone else can take the lock
        watchdog.stop().await;
        match self.locks.unlock(&handle).await {
            Ok(true) => debug!(key, "Wait-queue lock released"),
            Ok(false) => warn!(key, "Wait-queue lease lost before release"),
            Err(err) => warn!(key, error = %err, "Wait-queue lock release failed"),
        }
        written?;

        Ok(MutationReceipt {
            strategy: self.kind(),
            attempts: 1,
        })
    }
}
