//! Redis-backed stores.
//!
//! Sessions are JSON strings under `game:state:{id}`. Aggregates are hashes
//! with a sibling `{key}:version` counter; every write goes through a Lua
//! script so the hash and its version move together.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::Script;

use super::{AggregateStore, RecordLock, SessionStore, Versioned};
use crate::domain::{Aggregate, Session};
use crate::error::AppError;
use crate::lock::{LockHandle, LockProvider, RedisLockProvider};

fn session_key(game_id: &str) -> String {
    format!("game:state:{game_id}")
}

fn version_key(key: &str) -> String {
    format!("{key}:version")
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, game_id: &str) -> Result<Option<Session>, AppError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(session_key(game_id))
            .query_async(&mut conn)
            .await?;
        raw.map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }

    async fn set(&self, game_id: &str, session: &Session, ttl: Duration) -> Result<(), AppError> {
        let json = serde_json::to_string(session)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(session_key(game_id))
            .arg(json)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn insert_new(
        &self,
        game_id: &str,
        session: &Session,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let json = serde_json::to_string(session)?;
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(session_key(game_id))
            .arg(json)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, game_id: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(session_key(game_id))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Aggregates
// ============================================================================

// KEYS: hash, version. ARGV: ttl, field1, value1, ...
static STORE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
redis.call('DEL', KEYS[1])
if #ARGV > 1 then
    redis.call('HSET', KEYS[1], unpack(ARGV, 2))
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
local v = redis.call('INCR', KEYS[2])
redis.call('EXPIRE', KEYS[2], ARGV[1])
return v
",
    )
});

// KEYS: hash, version. ARGV: expected, ttl, field1, value1, ...
static STORE_IF_VERSION_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local current = tonumber(redis.call('GET', KEYS[2]) or '0')
if current ~= tonumber(ARGV[1]) then
    return 0
end
redis.call('DEL', KEYS[1])
if #ARGV > 2 then
    redis.call('HSET', KEYS[1], unpack(ARGV, 3))
    redis.call('EXPIRE', KEYS[1], ARGV[2])
end
redis.call('INCR', KEYS[2])
redis.call('EXPIRE', KEYS[2], ARGV[2])
return 1
",
    )
});

// KEYS: hash, version. ARGV: field, value, ttl
static UPSERT_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('EXPIRE', KEYS[1], ARGV[3])
redis.call('INCR', KEYS[2])
redis.call('EXPIRE', KEYS[2], ARGV[3])
return 1
",
    )
});

// KEYS: hash, version. ARGV: field
static REMOVE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local removed = redis.call('HDEL', KEYS[1], ARGV[1])
if removed > 0 then
    redis.call('INCR', KEYS[2])
end
return removed
",
    )
});

// KEYS: hash, version
static DRAIN_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local all = redis.call('HGETALL', KEYS[1])
redis.call('DEL', KEYS[1], KEYS[2])
return all
",
    )
});

const ROW_LOCK_PREFIX: &str = "rowlock:";

pub struct RedisAggregateStore {
    conn: ConnectionManager,
    locks: Arc<RedisLockProvider>,
    /// Lease on record locks; a crashed holder frees the row after this.
    row_lease: Duration,
}

impl RedisAggregateStore {
    pub fn new(
        conn: ConnectionManager,
        locks: Arc<RedisLockProvider>,
        row_lease: Duration,
    ) -> Self {
        Self {
            conn,
            locks,
            row_lease,
        }
    }
}

struct RedisRecordLock {
    locks: Arc<RedisLockProvider>,
    handle: LockHandle,
}

#[async_trait]
impl RecordLock for RedisRecordLock {
    async fn release(self: Box<Self>) -> Result<(), AppError> {
        if !self.locks.unlock(&self.handle).await? {
            tracing::warn!(lock = %self.handle.name, "Record lock lease expired before release");
        }
        Ok(())
    }
}

#[async_trait]
impl AggregateStore for RedisAggregateStore {
    async fn load(&self, key: &str) -> Result<Versioned<Aggregate>, AppError> {
        let mut conn = self.conn.clone();
        let (version, value): (Option<u64>, Aggregate) = redis::pipe()
            .atomic()
            .get(version_key(key))
            .hgetall(key)
            .query_async(&mut conn)
            .await?;
        Ok(Versioned {
            value,
            version: version.unwrap_or(0),
        })
    }

    async fn store(
        &self,
        key: &str,
        aggregate: &Aggregate,
        ttl: Duration,
    ) -> Result<u64, AppError> {
        let mut invocation = STORE_SCRIPT.prepare_invoke();
        invocation.key(key).key(version_key(key)).arg(ttl_secs(ttl));
        for (field, value) in aggregate {
            invocation.arg(field).arg(value);
        }
        let mut conn = self.conn.clone();
        let version: u64 = invocation.invoke_async(&mut conn).await?;
        Ok(version)
    }

    async fn store_if_version(
        &self,
        key: &str,
        aggregate: &Aggregate,
        expected: u64,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let mut invocation = STORE_IF_VERSION_SCRIPT.prepare_invoke();
        invocation
            .key(key)
            .key(version_key(key))
            .arg(expected)
            .arg(ttl_secs(ttl));
        for (field, value) in aggregate {
            invocation.arg(field).arg(value);
        }
        let mut conn = self.conn.clone();
        let stored: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(stored == 1)
    }

    async fn lock_for_update(
        &self,
        key: &str,
        wait: Duration,
    ) -> Result<Box<dyn RecordLock>, AppError> {
        let name = format!("{ROW_LOCK_PREFIX}{key}");
        match self.locks.try_lock(&name, wait, self.row_lease).await? {
            Some(handle) => Ok(Box::new(RedisRecordLock {
                locks: self.locks.clone(),
                handle,
            })),
            None => Err(AppError::lock_timeout(key, wait)),
        }
    }

    async fn upsert_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: i64 = UPSERT_SCRIPT
            .key(key)
            .key(version_key(key))
            .arg(field)
            .arg(value)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove_field(&self, key: &str, field: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: i64 = REMOVE_SCRIPT
            .key(key)
            .key(version_key(key))
            .arg(field)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn drain(&self, key: &str) -> Result<Aggregate, AppError> {
        let mut conn = self.conn.clone();
        let drained: Aggregate = DRAIN_SCRIPT
            .key(key)
            .key(version_key(key))
            .invoke_async(&mut conn)
            .await?;
        Ok(drained)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .arg(version_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
