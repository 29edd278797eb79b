// The same contract against a real Redis. Skipped unless REDIS_URL is set.

use std::time::Duration;

use mafia_backend::domain::{Phase, SubmissionKind};
use mafia_backend::{AppError, AppState, GameConfig, StrategyKind};

use super::strategy_helpers::{contended_config, fire_distinct_writers, fresh_key, recorded};
use crate::common::redis_url;

async fn redis_state(config: GameConfig) -> Result<Option<AppState>, AppError> {
    let Some(url) = redis_url() else {
        eprintln!("REDIS_URL not set; skipping Redis suite");
        return Ok(None);
    };
    Ok(Some(AppState::redis(config, &url).await?))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redis_strategies_keep_every_vote() -> Result<(), AppError> {
    let Some(state) = redis_state(contended_config()).await? else {
        return Ok(());
    };

    for kind in StrategyKind::ALL.into_iter().filter(|k| k.preserves_updates()) {
        let key = fresh_key(kind.as_str());
        let results = fire_distinct_writers(state.strategies().create(kind), &key, 30).await;
        assert!(results.iter().all(Result::is_ok), "{kind}: {results:?}");
        assert_eq!(recorded(&state, &key).await?, 30, "{kind}");
        state.aggregates.delete(&key).await?;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redis_drain_empties_the_aggregate() -> Result<(), AppError> {
    let Some(state) = redis_state(GameConfig::default()).await? else {
        return Ok(());
    };
    let key = fresh_key("drain");
    let ttl = Duration::from_secs(60);
    state.aggregates.upsert_field(&key, "a", "x", ttl).await?;
    state.aggregates.upsert_field(&key, "b", "y", ttl).await?;

    let drained = state.aggregates.drain(&key).await?;
    assert_eq!(drained.len(), 2);
    assert_eq!(recorded(&state, &key).await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redis_conditional_write_rejects_stale_versions() -> Result<(), AppError> {
    let Some(state) = redis_state(GameConfig::default()).await? else {
        return Ok(());
    };
    let key = fresh_key("cas");
    let ttl = Duration::from_secs(60);

    let first = state.aggregates.load(&key).await?;
    let mut next = first.value.clone();
    next.insert("a".into(), "x".into());
    assert!(state.aggregates.store_if_version(&key, &next, first.version, ttl).await?);
    // the same read version again has gone stale
    assert!(!state.aggregates.store_if_version(&key, &next, first.version, ttl).await?);

    state.aggregates.delete(&key).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redis_session_day_runs_end_to_end() -> Result<(), AppError> {
    let Some(state) = redis_state(GameConfig::default()).await? else {
        return Ok(());
    };
    let manager = state.session_manager_with(
        StrategyKind::Atomic,
        std::sync::Arc::new(mafia_backend::domain::FixedRoleAssigner(
            crate::support::game_setup::DEFAULT_ROLES.to_vec(),
        )),
        rand::SeedableRng::seed_from_u64(7),
    );
    let game_id = fresh_key("session");
    let players: Vec<_> = (0..6)
        .map(|i| mafia_backend::domain::Player::new(format!("{game_id}-p{i}"), format!("P{i}")))
        .collect();
    let ids: Vec<String> = players.iter().map(|p| p.id.clone()).collect();
    manager.create_session(&game_id, "room", players).await?;
    manager
        .start_game(&game_id, &mafia_backend::domain::RoleOptions::default())
        .await?;

    let discussion = manager.snapshot(&game_id).await?.ticket();
    manager.force_advance(&game_id, discussion).await?;
    assert_eq!(manager.snapshot(&game_id).await?.phase, Phase::DayVoting);

    for voter in &ids {
        manager.submit_vote(&game_id, voter, &ids[3]).await?;
    }
    assert_eq!(
        manager.submissions(&game_id, SubmissionKind::Vote).await?.len(),
        ids.len()
    );

    manager.evict(&game_id).await?;
    Ok(())
}
