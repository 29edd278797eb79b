//! Interchangeable ways to apply one submission to a submission aggregate.
//!
//! Every strategy honours the same contract: concurrent mutations of the same
//! key from distinct actors are all preserved (except `none`, the baseline
//! that shows the lost update), and different keys never wait on each other.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::GameConfig;
use crate::domain::Aggregate;
use crate::error::AppError;
use crate::lock::LockProvider;
use crate::store::AggregateStore;

pub mod atomic;
pub mod in_process;
pub mod none;
pub mod optimistic;
pub mod pessimistic;
pub mod spin_lock;
pub mod wait_queue;

pub use atomic::AtomicStrategy;
pub use in_process::InProcessStrategy;
pub use none::NoneStrategy;
pub use optimistic::OptimisticStrategy;
pub use pessimistic::PessimisticStrategy;
pub use spin_lock::SpinLockStrategy;
pub use wait_queue::WaitQueueStrategy;

/// Strategy names accepted by the factory and `GAME_LOCK_STRATEGY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StrategyKind {
    None,
    InProcess,
    Pessimistic,
    Optimistic,
    SpinLock,
    WaitQueue,
    Atomic,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 7] = [
        Self::None,
        Self::InProcess,
        Self::Pessimistic,
        Self::Optimistic,
        Self::SpinLock,
        Self::WaitQueue,
        Self::Atomic,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::InProcess => "in_process",
            Self::Pessimistic => "pessimistic",
            Self::Optimistic => "optimistic",
            Self::SpinLock => "spin_lock",
            Self::WaitQueue => "wait_queue",
            Self::Atomic => "atomic",
        }
    }

    /// Whether concurrent distinct-actor submissions are all preserved.
    pub const fn preserves_updates(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                AppError::config(format!(
                    "Unknown lock strategy '{s}' (expected one of: {})",
                    Self::ALL.map(StrategyKind::as_str).join(", ")
                ))
            })
    }
}

/// A field-level change to one aggregate, keyed by actor id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateMutation {
    /// Set `field` to `value`, replacing any earlier submission by the same actor.
    Upsert { field: String, value: String },
    Remove { field: String },
}

impl AggregateMutation {
    pub fn upsert(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Upsert {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn apply(&self, aggregate: &mut Aggregate) {
        match self {
            Self::Upsert { field, value } => {
                aggregate.insert(field.clone(), value.clone());
            }
            Self::Remove { field } => {
                aggregate.remove(field);
            }
        }
    }
}

/// What a successful mutation cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationReceipt {
    pub strategy: StrategyKind,
    /// 1 unless the strategy retried
    pub attempts: u32,
}

#[async_trait]
pub trait ConcurrencyStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn execute_with_mutation(
        &self,
        key: &str,
        mutation: &AggregateMutation,
    ) -> Result<MutationReceipt, AppError>;
}

/// Load, apply, write back. Only as safe as whatever the caller holds.
pub(crate) async fn read_modify_write(
    store: &dyn AggregateStore,
    key: &str,
    mutation: &AggregateMutation,
    ttl: Duration,
) -> Result<u64, AppError> {
    let current = store.load(key).await?;
    let mut aggregate = current.value;
    mutation.apply(&mut aggregate);
    let version = store.store(key, &aggregate, ttl).await?;
    debug!(key, read_version = current.version, version, "Aggregate rewritten");
    Ok(version)
}

/// Builds strategies by name over one set of backends.
#[derive(Clone)]
pub struct StrategyFactory {
    store: Arc<dyn AggregateStore>,
    locks: Arc<dyn LockProvider>,
    config: GameConfig,
}

impl StrategyFactory {
    pub fn new(
        store: Arc<dyn AggregateStore>,
        locks: Arc<dyn LockProvider>,
        config: GameConfig,
    ) -> Self {
        Self {
            store,
            locks,
            config,
        }
    }

    pub fn create(&self, kind: StrategyKind) -> Arc<dyn ConcurrencyStrategy> {
        let store = self.store.clone();
        let ttl = self.config.aggregate_ttl;
        match kind {
            StrategyKind::None => Arc::new(NoneStrategy::new(store, ttl)),
            StrategyKind::InProcess => {
                Arc::new(InProcessStrategy::new(store, ttl, self.config.lock_wait))
            }
            StrategyKind::Pessimistic => {
                Arc::new(PessimisticStrategy::new(store, ttl, self.config.lock_wait))
            }
            StrategyKind::Optimistic => {
                Arc::new(OptimisticStrategy::new(store, ttl, self.config.optimistic))
            }
            StrategyKind::SpinLock => Arc::new(SpinLockStrategy::new(
                store,
                self.locks.clone(),
                ttl,
                self.config.spin,
            )),
            StrategyKind::WaitQueue => Arc::new(WaitQueueStrategy::new(
                store,
                self.locks.clone(),
                ttl,
                self.config.lock_wait,
                self.config.lock_lease,
            )),
            StrategyKind::Atomic => Arc::new(AtomicStrategy::new(store, ttl)),
        }
    }

    pub fn create_by_name(&self, name: &str) -> Result<Arc<dyn ConcurrencyStrategy>, AppError> {
        Ok(self.create(name.parse()?))
    }
}
