//! Redis-backed [`LockProvider`].
//!
//! Acquire is `SET name token NX PX lease`. Release is a compare-and-delete
//! script that also publishes on `lock:released:{name}`; one background
//! pattern subscriber per process fans those messages out to local waiters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::Script;
use tokio::sync::Notify;
use tokio::time::{sleep, Instant};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use super::{LockHandle, LockProvider};
use crate::error::AppError;
use crate::infra::redis::{connect, is_transient_error, open_pubsub, subscriber_retry_delay};

pub const RELEASE_CHANNEL_PREFIX: &str = "lock:released:";

static UNLOCK_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('DEL', KEYS[1])
    redis.call('PUBLISH', ARGV[2], '1')
    return 1
end
return 0
",
    )
});

static EXTEND_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
",
    )
});

type Waiters = DashMap<String, Arc<Notify>>;

pub struct RedisLockProvider {
    conn: ConnectionManager,
    waiters: Arc<Waiters>,
}

impl RedisLockProvider {
    /// Connect and start the release subscriber.
    pub async fn connect(redis_url: &str) -> Result<Arc<Self>, AppError> {
        let conn = connect(redis_url).await?;
        let waiters = Arc::new(Waiters::new());
        spawn_release_subscriber(redis_url, waiters.clone());
        Ok(Arc::new(Self { conn, waiters }))
    }

    async fn set_nx(&self, handle: &LockHandle, lease: Duration) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(&handle.name)
            .arg(&handle.token)
            .arg("NX")
            .arg("PX")
            .arg(millis(lease))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    /// Remaining lease of the current holder; `None` when the key is gone.
    async fn remaining_lease(&self, name: &str) -> Result<Option<Duration>, AppError> {
        let mut conn = self.conn.clone();
        let pttl: i64 = redis::cmd("PTTL").arg(name).query_async(&mut conn).await?;
        Ok(match pttl {
            -2 => None,
            // no expiry set; rely on the release notification
            -1 => Some(Duration::MAX),
            ms => Some(Duration::from_millis(u64::try_from(ms).unwrap_or(0))),
        })
    }

    fn waiter(&self, name: &str) -> Arc<Notify> {
        self.waiters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    fn forget_waiter(&self, name: &str, notify: Arc<Notify>) {
        drop(notify);
        self.waiters
            .remove_if(name, |_, n| Arc::strong_count(n) == 1);
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl LockProvider for RedisLockProvider {
    async fn try_lock(
        &self,
        name: &str,
        wait: Duration,
        lease: Duration,
    ) -> Result<Option<LockHandle>, AppError> {
        let handle = LockHandle::fresh(name);
        if self.set_nx(&handle, lease).await? {
            return Ok(Some(handle));
        }
        if wait.is_zero() {
            return Ok(None);
        }

        let deadline = Instant::now() + wait;
        let notify = self.waiter(name);
        let outcome = loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.set_nx(&handle, lease).await {
                Ok(true) => break Ok(Some(handle)),
                Ok(false) => {}
                Err(err) => break Err(err),
            }
            let now = Instant::now();
            if now >= deadline {
                break Ok(None);
            }

            // wake on release, on holder expiry, or at the deadline
            let wake_at = match self.remaining_lease(name).await {
                Ok(None) => continue,
                Ok(Some(remaining)) => now
                    .checked_add(remaining)
                    .map_or(deadline, |t| t.min(deadline)),
                Err(err) => break Err(err),
            };
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        };
        self.forget_waiter(name, notify);
        outcome
    }

    async fn unlock(&self, handle: &LockHandle) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let released: i64 = UNLOCK_SCRIPT
            .key(&handle.name)
            .arg(&handle.token)
            .arg(format!("{RELEASE_CHANNEL_PREFIX}{}", handle.name))
            .invoke_async(&mut conn)
            .await?;
        Ok(released == 1)
    }

    async fn extend(&self, handle: &LockHandle, lease: Duration) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let extended: i64 = EXTEND_SCRIPT
            .key(&handle.name)
            .arg(&handle.token)
            .arg(millis(lease))
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }
}

// ============================================================================
// Release subscriber
// ============================================================================

fn spawn_release_subscriber(redis_url: &str, waiters: Arc<Waiters>) {
    let redis_url = redis_url.to_string();
    tokio::spawn(async move {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match run_release_subscription(&redis_url, &waiters).await {
                Ok(()) => {
                    info!("Lock release subscription completed normally");
                    break;
                }
                Err(err) if !is_transient_error(&err) => {
                    error!(error = %err, attempt, "Lock release subscription failed permanently");
                    break;
                }
                Err(err) => {
                    // waiters still wake on lease expiry or deadline meanwhile
                    let delay = subscriber_retry_delay(attempt);
                    warn!(
                        error = %err,
                        attempt,
                        retry_delay_secs = delay.as_secs_f64(),
                        "Lock release subscription failed, retrying"
                    );
                    sleep(delay).await;
                    if attempt >= 20 {
                        attempt = 10;
                    }
                }
            }
        }
    });
}

async fn run_release_subscription(redis_url: &str, waiters: &Waiters) -> Result<(), AppError> {
    let mut pubsub = open_pubsub(redis_url).await?;
    pubsub
        .psubscribe(format!("{RELEASE_CHANNEL_PREFIX}*"))
        .await?;
    info!("Subscribed to lock release notifications");

    let mut stream = pubsub.into_on_message();
    while let Some(msg) = stream.next().await {
        let Ok(channel) = msg.get_channel::<String>() else {
            continue;
        };
        let Some(name) = channel.strip_prefix(RELEASE_CHANNEL_PREFIX) else {
            continue;
        };
        if let Some(notify) = waiters.get(name) {
            debug!(lock = name, "Lock released, waking waiters");
            notify.notify_waiters();
        }
    }

    warn!("Lock release subscription stream ended, connection lost");
    Err(AppError::store_unavailable(
        "lock release subscription stream ended unexpectedly",
    ))
}
