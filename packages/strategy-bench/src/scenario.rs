//! One contended voting round per strategy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mafia_backend::domain::{Phase, Player, RoleOptions, ShuffledRoleAssigner};
use mafia_backend::{AppError, AppState, GameConfig, SessionManager, StrategyKind};
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::report::{StrategyReport, VoteSample};

#[derive(Debug, Clone)]
pub struct Scenario {
    pub sessions: usize,
    pub players: usize,
    pub latency: Duration,
    pub seed: u64,
}

async fn backends(config: &GameConfig, latency: Duration) -> Result<AppState, AppError> {
    match &config.redis_url {
        Some(url) => AppState::redis(config.clone(), url).await,
        None => Ok(AppState::in_memory_with_latency(config.clone(), latency)),
    }
}

/// Create, start and walk a session into DAY_VOTING. Returns its player ids.
async fn prepare_session(
    manager: &SessionManager,
    game_id: &str,
    players: usize,
) -> Result<Vec<String>, AppError> {
    let roster: Vec<Player> = (0..players)
        .map(|i| Player::new(format!("{game_id}-p{i}"), format!("Player {i}")))
        .collect();
    let ids = roster.iter().map(|p| p.id.clone()).collect();
    manager.create_session(game_id, "bench", roster).await?;
    manager.start_game(game_id, &RoleOptions::default()).await?;

    let ticket = manager.snapshot(game_id).await?.ticket();
    manager.force_advance(game_id, ticket).await?;
    let session = manager.snapshot(game_id).await?;
    if session.phase != Phase::DayVoting {
        return Err(AppError::internal(format!(
            "session {game_id} reached {} instead of day voting",
            session.phase.as_str()
        )));
    }
    Ok(ids)
}

pub async fn run_scenario(
    config: &GameConfig,
    kind: StrategyKind,
    scenario: &Scenario,
) -> Result<StrategyReport, AppError> {
    let state = backends(config, scenario.latency).await?;
    let manager = state.session_manager_with(
        kind,
        Arc::new(ShuffledRoleAssigner::seeded(scenario.seed)),
        ChaCha8Rng::seed_from_u64(scenario.seed),
    );
    let run_id = format!("{}-{}", kind.as_str(), rand::random::<u32>());

    let mut tables = Vec::with_capacity(scenario.sessions);
    for n in 0..scenario.sessions {
        let game_id = format!("bench-{run_id}-{n}");
        let ids = prepare_session(&manager, &game_id, scenario.players).await?;
        tables.push((game_id, ids));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(scenario.seed);
    let wall = Instant::now();
    let mut tasks = Vec::new();
    for (game_id, ids) in &tables {
        for voter in ids {
            let target = ids.choose(&mut rng).cloned().unwrap_or_else(|| voter.clone());
            let manager = manager.clone();
            let game_id = game_id.clone();
            let voter = voter.clone();
            tasks.push(tokio::spawn(async move {
                let started = Instant::now();
                let result = manager.submit_vote(&game_id, &voter, &target).await;
                VoteSample::new(started.elapsed(), result)
            }));
        }
    }

    let mut samples = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(sample) => samples.push(sample),
            Err(e) => warn!(strategy = %kind, error = %e, "Vote task panicked"),
        }
    }
    let wall = wall.elapsed();

    let mut recorded = 0;
    for (game_id, _) in &tables {
        recorded += manager
            .submissions(game_id, mafia_backend::domain::SubmissionKind::Vote)
            .await?
            .len();
        if let Err(e) = manager.evict(game_id).await {
            warn!(game_id = %game_id, error = %e, "Failed to evict bench session");
        }
    }
    debug!(strategy = %kind, recorded, "Scenario finished");

    Ok(StrategyReport::from_samples(kind, &samples, recorded, wall))
}
