// Shared drivers for the concurrency suites.

use std::sync::Arc;
use std::time::Duration;

use backend_test_support::unique_helpers::unique_str;
use mafia_backend::config::{OptimisticSettings, SpinSettings};
use mafia_backend::{
    AggregateMutation, AppError, AppState, ConcurrencyStrategy, GameConfig, MutationReceipt,
};

/// Config whose retry budgets survive a hundred-way pile-up on one key.
pub fn contended_config() -> GameConfig {
    GameConfig {
        optimistic: OptimisticSettings {
            max_retries: 500,
            backoff: Duration::from_millis(1),
        },
        spin: SpinSettings {
            max_retries: 5000,
            interval: Duration::from_millis(2),
            lease: Duration::from_secs(10),
        },
        lock_wait: Duration::from_secs(30),
        ..GameConfig::default()
    }
}

pub fn fresh_key(label: &str) -> String {
    unique_str(&format!("game:{label}:votes"))
}

/// `writers` distinct actors each upsert one field of `key` at once.
pub async fn fire_distinct_writers(
    strategy: Arc<dyn ConcurrencyStrategy>,
    key: &str,
    writers: usize,
) -> Vec<Result<MutationReceipt, AppError>> {
    let tasks: Vec<_> = (0..writers)
        .map(|i| {
            let strategy = strategy.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                let mutation = AggregateMutation::upsert(format!("voter-{i}"), "target");
                strategy.execute_with_mutation(&key, &mutation).await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(writers);
    for task in tasks {
        results.push(task.await.expect("writer task panicked"));
    }
    results
}

pub async fn recorded(state: &AppState, key: &str) -> Result<usize, AppError> {
    Ok(state.aggregates.load(key).await?.value.len())
}
