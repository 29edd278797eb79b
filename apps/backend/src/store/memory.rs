//! In-process stores backed by `DashMap`.
//!
//! Each operation completes under a single map-entry lock, which gives the
//! same per-command atomicity a Redis server does. An optional simulated
//! round trip is awaited before every operation so interleavings between
//! concurrent read-modify-write cycles show up in-process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{sleep, Instant};

use super::{AggregateStore, RecordLock, SessionStore, Versioned};
use crate::domain::{Aggregate, Session};
use crate::error::AppError;

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, (Session, Instant)>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, game_id: &str) -> Result<Option<Session>, AppError> {
        let now = Instant::now();
        let expired = match self.sessions.get(game_id) {
            None => return Ok(None),
            Some(entry) if entry.1 > now => return Ok(Some(entry.0.clone())),
            Some(_) => true,
        };
        if expired {
            self.sessions.remove_if(game_id, |_, (_, expires)| *expires <= now);
        }
        Ok(None)
    }

    async fn set(&self, game_id: &str, session: &Session, ttl: Duration) -> Result<(), AppError> {
        self.sessions
            .insert(game_id.to_string(), (session.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn insert_new(
        &self,
        game_id: &str,
        session: &Session,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let now = Instant::now();
        let mut entry = self.sessions.entry(game_id.to_string()).or_insert_with(|| {
            // placeholder that is already expired
            (session.clone(), now)
        });
        if entry.1 > now {
            return Ok(false);
        }
        *entry = (session.clone(), now + ttl);
        Ok(true)
    }

    async fn delete(&self, game_id: &str) -> Result<(), AppError> {
        self.sessions.remove(game_id);
        Ok(())
    }
}

struct Slot {
    fields: Aggregate,
    version: u64,
    expires_at: Instant,
}

/// Hash-field aggregates with versions drawn from one process-wide counter.
#[derive(Default)]
pub struct MemoryAggregateStore {
    slots: DashMap<String, Slot>,
    row_locks: Arc<RowLocks>,
    next_version: AtomicU64,
    latency: Duration,
}

impl MemoryAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Await `latency` before every operation.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current version, treating an expired slot as missing.
    fn current(&self, key: &str, now: Instant) -> Option<(Aggregate, u64)> {
        let slot = self.slots.get(key)?;
        (slot.expires_at > now).then(|| (slot.fields.clone(), slot.version))
    }
}

type RowLocks = DashMap<String, Arc<Mutex<()>>>;

/// Releases on drop; the row's mutex is forgotten once nobody waits on it.
struct MemoryRecordLock {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    row_locks: Arc<RowLocks>,
}

impl Drop for MemoryRecordLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.row_locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[async_trait]
impl RecordLock for MemoryRecordLock {
    async fn release(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl AggregateStore for MemoryAggregateStore {
    async fn load(&self, key: &str) -> Result<Versioned<Aggregate>, AppError> {
        self.round_trip().await;
        let (value, version) = self
            .current(key, Instant::now())
            .unwrap_or((Aggregate::new(), 0));
        Ok(Versioned { value, version })
    }

    async fn store(
        &self,
        key: &str,
        aggregate: &Aggregate,
        ttl: Duration,
    ) -> Result<u64, AppError> {
        self.round_trip().await;
        let version = self.bump();
        self.slots.insert(
            key.to_string(),
            Slot {
                fields: aggregate.clone(),
                version,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(version)
    }

    async fn store_if_version(
        &self,
        key: &str,
        aggregate: &Aggregate,
        expected: u64,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        self.round_trip().await;
        let now = Instant::now();
        let mut slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            fields: Aggregate::new(),
            version: 0,
            expires_at: now,
        });
        let current = if slot.expires_at > now { slot.version } else { 0 };
        if current != expected {
            return Ok(false);
        }
        slot.fields = aggregate.clone();
        slot.version = self.bump();
        slot.expires_at = now + ttl;
        Ok(true)
    }

    async fn lock_for_update(
        &self,
        key: &str,
        wait: Duration,
    ) -> Result<Box<dyn RecordLock>, AppError> {
        self.round_trip().await;
        let mutex = self
            .row_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        match tokio::time::timeout(wait, mutex.lock_owned()).await {
            Ok(guard) => Ok(Box::new(MemoryRecordLock {
                key: key.to_string(),
                guard: Some(guard),
                row_locks: self.row_locks.clone(),
            })),
            Err(_) => {
                self.row_locks
                    .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
                Err(AppError::lock_timeout(key, wait))
            }
        }
    }

    async fn upsert_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), AppError> {
        self.round_trip().await;
        let now = Instant::now();
        let mut slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            fields: Aggregate::new(),
            version: 0,
            expires_at: now,
        });
        if slot.expires_at <= now {
            slot.fields.clear();
        }
        slot.fields.insert(field.to_string(), value.to_string());
        slot.version = self.bump();
        slot.expires_at = now + ttl;
        Ok(())
    }

    async fn remove_field(&self, key: &str, field: &str) -> Result<(), AppError> {
        self.round_trip().await;
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.fields.remove(field);
            slot.version = self.bump();
        }
        Ok(())
    }

    async fn drain(&self, key: &str) -> Result<Aggregate, AppError> {
        self.round_trip().await;
        let now = Instant::now();
        Ok(self
            .slots
            .remove(key)
            .filter(|(_, slot)| slot.expires_at > now)
            .map(|(_, slot)| slot.fields)
            .unwrap_or_default())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.round_trip().await;
        self.slots.remove(key);
        self.row_locks
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
        Ok(())
    }
}
