use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::broadcast::{Broadcaster, RedisBroadcaster, TracingBroadcaster};
use crate::concurrency::{StrategyFactory, StrategyKind};
use crate::config::GameConfig;
use crate::domain::{RoleAssigner, ShuffledRoleAssigner};
use crate::error::AppError;
use crate::infra::redis::connect;
use crate::lock::{LockProvider, MemoryLockProvider, RedisLockProvider};
use crate::services::{SessionManager, SessionManagerParts};
use crate::store::{
    AggregateStore, MemoryAggregateStore, MemorySessionStore, RedisAggregateStore,
    RedisSessionStore, SessionStore,
};

/// Shared backends, wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: GameConfig,
    pub sessions: Arc<dyn SessionStore>,
    pub aggregates: Arc<dyn AggregateStore>,
    pub locks: Arc<dyn LockProvider>,
    pub broadcaster: Arc<dyn Broadcaster>,
}

impl AppState {
    /// Redis backends when `redis_url` is set, in-memory ones otherwise.
    pub async fn from_config(config: GameConfig) -> Result<Self, AppError> {
        match config.redis_url.clone() {
            Some(url) => Self::redis(config, &url).await,
            None => Ok(Self::in_memory(config)),
        }
    }

    pub async fn redis(config: GameConfig, redis_url: &str) -> Result<Self, AppError> {
        let conn = connect(redis_url).await?;
        let locks = RedisLockProvider::connect(redis_url).await?;
        info!(strategy = %config.strategy, "Using Redis backends");
        Ok(Self {
            sessions: Arc::new(RedisSessionStore::new(conn.clone())),
            aggregates: Arc::new(RedisAggregateStore::new(
                conn.clone(),
                locks.clone(),
                config.lock_lease,
            )),
            locks,
            broadcaster: Arc::new(RedisBroadcaster::new(conn)),
            config,
        })
    }

    pub fn in_memory(config: GameConfig) -> Self {
        Self::in_memory_with_latency(config, Duration::ZERO)
    }

    /// In-memory backends whose aggregate store waits `latency` per call,
    /// standing in for a network round trip.
    pub fn in_memory_with_latency(config: GameConfig, latency: Duration) -> Self {
        Self {
            sessions: Arc::new(MemorySessionStore::new()),
            aggregates: Arc::new(MemoryAggregateStore::with_latency(latency)),
            locks: Arc::new(MemoryLockProvider::new()),
            broadcaster: Arc::new(TracingBroadcaster),
            config,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn strategies(&self) -> StrategyFactory {
        StrategyFactory::new(self.aggregates.clone(), self.locks.clone(), self.config.clone())
    }

    /// Session manager using the configured strategy and shuffled roles.
    pub fn session_manager(&self) -> Arc<SessionManager> {
        self.session_manager_with(
            self.config.strategy,
            Arc::new(ShuffledRoleAssigner::from_os_rng()),
            ChaCha8Rng::from_os_rng(),
        )
    }

    pub fn session_manager_with(
        &self,
        strategy: StrategyKind,
        roles: Arc<dyn RoleAssigner>,
        rng: ChaCha8Rng,
    ) -> Arc<SessionManager> {
        let parts = SessionManagerParts {
            sessions: self.sessions.clone(),
            aggregates: self.aggregates.clone(),
            strategy: self.strategies().create(strategy),
            broadcaster: self.broadcaster.clone(),
            roles,
            rng,
        };
        SessionManager::new(parts, self.config.clone())
    }
}
