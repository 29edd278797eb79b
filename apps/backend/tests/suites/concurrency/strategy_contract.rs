// Every preserving strategy keeps all distinct-actor submissions.
//
// These run on a multi-threaded runtime with a simulated store round trip so
// the writers genuinely interleave.

use std::time::{Duration, Instant};

use mafia_backend::domain::{Phase, Role, SubmissionKind};
use mafia_backend::{AggregateMutation, AppError, AppState, ErrorCode, GameConfig, StrategyKind};

use super::strategy_helpers::{contended_config, fire_distinct_writers, fresh_key, recorded};
use crate::support::game_setup::{setup_game, GameSetupOptions};

const WRITERS: usize = 100;

async fn assert_all_kept(kind: StrategyKind) -> Result<(), AppError> {
    let state = AppState::in_memory_with_latency(contended_config(), Duration::from_millis(1));
    let key = fresh_key(kind.as_str());

    let results = fire_distinct_writers(state.strategies().create(kind), &key, WRITERS).await;

    for result in results {
        let receipt = result?;
        assert_eq!(receipt.strategy, kind);
        assert!(receipt.attempts >= 1);
    }
    assert_eq!(recorded(&state, &key).await?, WRITERS, "{kind} lost updates");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_process_keeps_every_vote() -> Result<(), AppError> {
    assert_all_kept(StrategyKind::InProcess).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pessimistic_keeps_every_vote() -> Result<(), AppError> {
    assert_all_kept(StrategyKind::Pessimistic).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_optimistic_keeps_every_vote_with_budget() -> Result<(), AppError> {
    assert_all_kept(StrategyKind::Optimistic).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_spin_lock_keeps_every_vote() -> Result<(), AppError> {
    assert_all_kept(StrategyKind::SpinLock).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wait_queue_keeps_every_vote() -> Result<(), AppError> {
    assert_all_kept(StrategyKind::WaitQueue).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_atomic_keeps_every_vote() -> Result<(), AppError> {
    assert_all_kept(StrategyKind::Atomic).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_optimistic_default_budget_never_loses_silently() -> Result<(), AppError> {
    let state = AppState::in_memory_with_latency(GameConfig::default(), Duration::from_millis(1));
    let key = fresh_key("optimistic-default");

    let results =
        fire_distinct_writers(state.strategies().create(StrategyKind::Optimistic), &key, 50).await;

    let mut succeeded = 0;
    for result in results {
        match result {
            Ok(receipt) => {
                assert!(receipt.attempts <= 4);
                succeeded += 1;
            }
            Err(err) => assert_eq!(err.code(), ErrorCode::ConflictExhausted),
        }
    }
    // exhausted writers report failure; nobody is dropped quietly
    assert_eq!(recorded(&state, &key).await?, succeeded);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_actor_overwrites_under_every_strategy() -> Result<(), AppError> {
    let state = AppState::in_memory(contended_config());
    for kind in StrategyKind::ALL {
        let key = fresh_key(kind.as_str());
        let strategy = state.strategies().create(kind);
        strategy
            .execute_with_mutation(&key, &AggregateMutation::upsert("voter", "A"))
            .await?;
        strategy
            .execute_with_mutation(&key, &AggregateMutation::upsert("voter", "B"))
            .await?;

        let aggregate = state.aggregates.load(&key).await?.value;
        assert_eq!(aggregate.len(), 1, "{kind}");
        assert_eq!(aggregate.get("voter").map(String::as_str), Some("B"), "{kind}");
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_held_record_does_not_block_other_keys() -> Result<(), AppError> {
    let state = AppState::in_memory(GameConfig::default());
    let busy = fresh_key("busy");
    let idle = fresh_key("idle");
    let hold = state
        .aggregates
        .lock_for_update(&busy, Duration::from_secs(1))
        .await?;

    let started = Instant::now();
    state
        .strategies()
        .create(StrategyKind::Pessimistic)
        .execute_with_mutation(&idle, &AggregateMutation::upsert("voter", "A"))
        .await?;
    assert!(started.elapsed() < Duration::from_secs(1));

    hold.release().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_keys_in_parallel() -> Result<(), AppError> {
    let state = AppState::in_memory_with_latency(contended_config(), Duration::from_millis(1));
    for kind in [StrategyKind::WaitQueue, StrategyKind::SpinLock] {
        let keys: Vec<String> = (0..8).map(|i| fresh_key(&format!("{kind}-{i}"))).collect();
        let batches: Vec<_> = keys
            .iter()
            .map(|key| fire_distinct_writers(state.strategies().create(kind), key, 10))
            .collect();
        for results in futures::future::join_all(batches).await {
            assert!(results.iter().all(Result::is_ok), "{kind}");
        }
        for key in &keys {
            assert_eq!(recorded(&state, key).await?, 10, "{kind} {key}");
        }
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_session_manager_keeps_a_crowded_vote() -> Result<(), AppError> {
    let mut roles = vec![Role::Mafia, Role::Doctor, Role::Police];
    roles.resize(40, Role::Citizen);
    for kind in StrategyKind::ALL.into_iter().filter(|k| k.preserves_updates()) {
        let setup = setup_game(
            GameSetupOptions::default()
                .with_roles(&roles)
                .with_strategy(kind)
                .with_config(contended_config())
                .with_latency(Duration::from_millis(1)),
        )
        .await?;
        setup.advance_to(Phase::DayVoting).await?;

        let tasks: Vec<_> = setup
            .player_ids
            .iter()
            .map(|voter| {
                let manager = setup.manager.clone();
                let game_id = setup.game_id.clone();
                let voter = voter.clone();
                let target = setup.player(3).to_string();
                tokio::spawn(async move { manager.submit_vote(&game_id, &voter, &target).await })
            })
            .collect();
        for task in tasks {
            task.await.expect("voter task panicked")?;
        }

        let votes = setup
            .manager
            .submissions(&setup.game_id, SubmissionKind::Vote)
            .await?;
        assert_eq!(votes.len(), roles.len(), "{kind}");

        setup.advance().await?;
        assert_eq!(
            setup.session().await?.defendant.as_deref(),
            Some(setup.player(3)),
            "{kind}"
        );
    }
    Ok(())
}
