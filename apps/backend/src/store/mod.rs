//! Storage contracts for the session document and the submission aggregates.
//!
//! The session document is the authoritative game state. Submissions live
//! beside it in per-session, per-kind aggregates so concurrent writers never
//! rewrite the whole document.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Aggregate, Session};
use crate::error::AppError;

pub mod memory;
pub mod redis;

pub use memory::{MemoryAggregateStore, MemorySessionStore};
pub use self::redis::{RedisAggregateStore, RedisSessionStore};

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    /// Changes on every write to the key.
    pub version: u64,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, game_id: &str) -> Result<Option<Session>, AppError>;

    async fn set(&self, game_id: &str, session: &Session, ttl: Duration) -> Result<(), AppError>;

    /// Write only if no session exists under `game_id`. Returns false otherwise.
    async fn insert_new(
        &self,
        game_id: &str,
        session: &Session,
        ttl: Duration,
    ) -> Result<bool, AppError>;

    async fn delete(&self, game_id: &str) -> Result<(), AppError>;
}

/// Exclusive hold on one aggregate record, returned by
/// [`AggregateStore::lock_for_update`].
#[async_trait]
pub trait RecordLock: Send {
    async fn release(self: Box<Self>) -> Result<(), AppError>;
}

#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Missing keys read as an empty aggregate at the current version.
    async fn load(&self, key: &str) -> Result<Versioned<Aggregate>, AppError>;

    /// Replace the whole aggregate. Returns the new version.
    async fn store(&self, key: &str, aggregate: &Aggregate, ttl: Duration) -> Result<u64, AppError>;

    /// Replace only if the version is still `expected`.
    async fn store_if_version(
        &self,
        key: &str,
        aggregate: &Aggregate,
        expected: u64,
        ttl: Duration,
    ) -> Result<bool, AppError>;

    /// Block up to `wait` for exclusive access to `key`; `LockTimeout` otherwise.
    ///
    /// Only writers that also take the record lock are excluded.
    async fn lock_for_update(&self, key: &str, wait: Duration)
        -> Result<Box<dyn RecordLock>, AppError>;

    /// Single-command field upsert.
    async fn upsert_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), AppError>;

    async fn remove_field(&self, key: &str, field: &str) -> Result<(), AppError>;

    /// Atomically read and delete.
    async fn drain(&self, key: &str) -> Result<Aggregate, AppError>;

    async fn delete(&self, key: &str) -> Result<(), AppError>;
}
