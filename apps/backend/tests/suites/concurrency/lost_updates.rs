// The unprotected baseline loses submissions under contention.
//
// Runs on paused time: every writer reads before any writer stores, so the
// interleaving is deterministic.

use std::time::Duration;

use mafia_backend::{AppError, AppState, GameConfig, StrategyKind};

use super::strategy_helpers::{fire_distinct_writers, fresh_key, recorded};

#[tokio::test(start_paused = true)]
async fn test_none_loses_concurrent_votes() -> Result<(), AppError> {
    let state = AppState::in_memory_with_latency(GameConfig::default(), Duration::from_millis(1));
    let strategy = state.strategies().create(StrategyKind::None);
    let key = fresh_key("none");

    let results = fire_distinct_writers(strategy, &key, 100).await;

    // every call reports success...
    assert!(results.iter().all(Result::is_ok));
    // ...but most of them were overwritten
    let kept = recorded(&state, &key).await?;
    assert!(kept < 100, "expected lost updates, kept {kept}");
    assert!(kept >= 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_none_is_fine_without_contention() -> Result<(), AppError> {
    let state = AppState::in_memory_with_latency(GameConfig::default(), Duration::from_millis(1));
    let strategy = state.strategies().create(StrategyKind::None);
    let key = fresh_key("none-serial");

    for i in 0..10 {
        strategy
            .execute_with_mutation(
                &key,
                &mafia_backend::AggregateMutation::upsert(format!("voter-{i}"), "x"),
            )
            .await?;
    }
    assert_eq!(recorded(&state, &key).await?, 10);
    Ok(())
}
