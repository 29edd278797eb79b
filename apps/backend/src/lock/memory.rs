use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{LockHandle, LockProvider};
use crate::error::AppError;

#[derive(Default)]
struct Slot {
    holder: Option<(String, Instant)>,
    released: Arc<Notify>,
}

/// Process-local [`LockProvider`]; waiters park on a per-name `Notify`.
#[derive(Default)]
pub struct MemoryLockProvider {
    slots: Mutex<HashMap<String, Slot>>,
}

enum Attempt {
    Acquired(LockHandle),
    Held {
        released: Arc<Notify>,
        expires_at: Instant,
    },
}

impl MemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn attempt(&self, name: &str, lease: Duration) -> Attempt {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let slot = slots.entry(name.to_string()).or_default();
        match &slot.holder {
            Some((_, expires_at)) if *expires_at > now => Attempt::Held {
                released: slot.released.clone(),
                expires_at: *expires_at,
            },
            _ => {
                let handle = LockHandle::fresh(name);
                slot.holder = Some((handle.token.clone(), now + lease));
                Attempt::Acquired(handle)
            }
        }
    }
}

#[async_trait]
impl LockProvider for MemoryLockProvider {
    async fn try_lock(
        &self,
        name: &str,
        wait: Duration,
        lease: Duration,
    ) -> Result<Option<LockHandle>, AppError> {
        let deadline = Instant::now() + wait;
        loop {
            let (released, expires_at) = match self.attempt(name, lease) {
                Attempt::Acquired(handle) => return Ok(Some(handle)),
                Attempt::Held {
                    released,
                    expires_at,
                } => (released, expires_at),
            };
            if Instant::now() >= deadline {
                return Ok(None);
            }

            // register before re-checking so a release in between is not missed
            let notified = released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Attempt::Acquired(handle) = self.attempt(name, lease) {
                return Ok(Some(handle));
            }

            let _ = tokio::time::timeout_at(deadline.min(expires_at), notified).await;
        }
    }

    async fn unlock(&self, handle: &LockHandle) -> Result<bool, AppError> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&handle.name) else {
            return Ok(false);
        };
        let held = matches!(
            &slot.holder,
            Some((token, expires_at)) if *token == handle.token && *expires_at > now
        );
        if held {
            slot.holder = None;
            slot.released.notify_waiters();
        }
        if slot.holder.is_none() && Arc::strong_count(&slot.released) == 1 {
            slots.remove(&handle.name);
        }
        Ok(held)
    }

    async fn extend(&self, handle: &LockHandle, lease: Duration) -> Result<bool, AppError> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&handle.name) else {
            return Ok(false);
        };
        match &mut slot.holder {
            Some((token, expires_at)) if *token == handle.token && *expires_at > now => {
                *expires_at = now + lease;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
