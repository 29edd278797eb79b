//! Named, leased mutual exclusion.
//!
//! A lock is held by whoever presents the token it was acquired with. Leases
//! expire on their own so a crashed holder cannot wedge a session; holders
//! that need longer keep the lease alive with a [`LeaseWatchdog`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;

pub mod memory;
pub mod redis;

pub use memory::MemoryLockProvider;
pub use self::redis::RedisLockProvider;

/// Proof of holding the lock `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub name: String,
    pub token: String,
}

impl LockHandle {
    pub(crate) fn fresh(name: &str) -> Self {
        Self {
            name: name.to_string(),
            token: Uuid::new_v4().to_string(),
        }
    }
}

#[async_trait]
pub trait LockProvider: Send + Sync + 'static {
    /// Acquire `name` for `lease`, waiting up to `wait` for the current holder
    /// to release it. A zero `wait` makes exactly one attempt.
    ///
    /// Waiters are woken by release notifications, not by polling.
    async fn try_lock(
        &self,
        name: &str,
        wait: Duration,
        lease: Duration,
    ) -> Result<Option<LockHandle>, AppError>;

    /// Release if still held by `handle`. Returns false if the lease had
    /// already expired or passed to someone else.
    async fn unlock(&self, handle: &LockHandle) -> Result<bool, AppError>;

    /// Push the lease out to `lease` from now, if still held by `handle`.
    async fn extend(&self, handle: &LockHandle, lease: Duration) -> Result<bool, AppError>;
}

// ============================================================================
// Lease watchdog
// ============================================================================

/// Renews a held lease every `lease / 3` until stopped or dropped.
pub struct LeaseWatchdog {
    cancel: CancellationToken,
    lost: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl LeaseWatchdog {
    pub fn start(provider: Arc<dyn LockProvider>, handle: LockHandle, lease: Duration) -> Self {
        let cancel = CancellationToken::new();
        let lost = Arc::new(AtomicBool::new(false));
        let period = (lease / 3).max(Duration::from_millis(1));

        let task = tokio::spawn({
            let cancel = cancel.clone();
            let lost = lost.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(period) => {}
                    }
                    match provider.extend(&handle, lease).await {
                        Ok(true) => {
                            debug!(
                                lock = %handle.name,
                                lease_ms = lease.as_millis(),
                                "Lease renewed"
                            );
                        }
                        Ok(false) => {
                            warn!(lock = %handle.name, "Lease lost before release");
                            lost.store(true, Ordering::SeqCst);
                            break;
                        }
                        Err(err) => {
                            // keep trying; the lease is still running
                            warn!(lock = %handle.name, error = %err, "Lease renewal failed");
                        }
                    }
                }
            }
        });

        Self {
            cancel,
            lost,
            task: Some(task),
        }
    }

    /// True once a renewal found the lock no longer held.
    pub fn lease_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Stop renewing and wait for the renewal task to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LeaseWatchdog {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
