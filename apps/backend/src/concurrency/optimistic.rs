use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::random;
use tracing::{debug, warn};

use super::{AggregateMutation, ConcurrencyStrategy, MutationReceipt, StrategyKind};
use crate::config::OptimisticSettings;
use crate::error::AppError;
use crate::store::AggregateStore;

const BACKOFF_CAP: Duration = Duration::from_secs(2);

/// Version-checked write, retried on conflict.
///
/// Makes at most `max_retries + 1` attempts; after that the submission is
/// rejected with `ConflictExhausted` rather than silently dropped.
pub struct OptimisticStrategy {
    store: Arc<dyn AggregateStore>,
    ttl: Duration,
    settings: OptimisticSettings,
}

impl OptimisticStrategy {
    pub fn new(
        store: Arc<dyn AggregateStore>,
        ttl: Duration,
        settings: OptimisticSettings,
    ) -> Self {
        Self {
            store,
            ttl,
            settings,
        }
    }

    /// `backoff * 2^(attempt-1)`, capped, with +/-20% jitter.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .settings
            .backoff
            .saturating_mul(1u32 << exp)
            .min(BACKOFF_CAP);
        base.mul_f64(0.8 + random::<f64>() * 0.4)
    }
}

#[async_trait]
impl ConcurrencyStrategy for OptimisticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Optimistic
    }

    async fn execute_with_mutation(
        &self,
        key: &str,
        mutation: &AggregateMutation,
    ) -> Result<MutationReceipt, AppError> {
        let max_attempts = self.settings.max_retries.saturating_add(1);
        for attempt in 1..=max_attempts {
            let current = self.store.load(key).await?;
            let mut aggregate = current.value;
            mutation.apply(&mut aggregate);

            if self
                .store
                .store_if_version(key, &aggregate, current.version, self.ttl)
                .await?
            {
                if attempt > 1 {
                    debug!(
                        key,
                        attempt,
                        strategy = %self.kind(),
                        "Optimistic write landed after retry"
                    );
                }
                return Ok(MutationReceipt {
                    strategy: self.kind(),
                    attempts: attempt,
                });
            }

            debug!(
                key,
                attempt,
                strategy = %self.kind(),
                read_version = current.version,
                "Version conflict"
            );
            if attempt < max_attempts {
                tokio::time::sleep(self.backoff_for(attempt)).await;
            }
        }

        warn!(
            key,
            attempts = max_attempts,
            strategy = %self.kind(),
            "Optimistic retries exhausted"
        );
        Err(AppError::conflict_exhausted(key, max_attempts))
    }
}
