//! Strategy bench CLI - fire a crowded day vote at every concurrency strategy.
//!
//! Each run prepares sessions sitting in DAY_VOTING, submits every player's
//! vote at once and compares what the strategy reported with what the
//! aggregate actually kept.

mod report;
mod scenario;

use std::time::Duration;

use clap::Parser;
use mafia_backend::{GameConfig, StrategyKind};
use report::{print_table, StrategyReport};
use scenario::{run_scenario, Scenario};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "strategy-bench")]
#[command(about = "Compare session aggregate concurrency strategies under contention")]
struct Args {
    /// Strategies to run (comma separated), or "all"
    #[arg(short, long, default_value = "all", value_delimiter = ',')]
    strategy: Vec<String>,

    /// Concurrent sessions per strategy
    #[arg(long, default_value = "4")]
    sessions: usize,

    /// Players per session; every one of them votes
    #[arg(short, long, default_value = "40")]
    players: usize,

    /// Simulated store round trip for the in-memory backends
    #[arg(long, default_value = "1")]
    latency_ms: u64,

    /// Run against Redis instead of the in-memory backends
    #[arg(long)]
    redis_url: Option<String>,

    /// Seed for role assignment and vote targets
    #[arg(long)]
    seed: Option<u64>,

    /// Print reports as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Enable verbose (JSON) logging
    #[arg(short, long)]
    verbose: bool,
}

fn selected_strategies(names: &[String]) -> Result<Vec<StrategyKind>, Box<dyn std::error::Error>> {
    if names.iter().any(|n| n.trim().eq_ignore_ascii_case("all")) {
        return Ok(StrategyKind::ALL.to_vec());
    }
    let mut kinds = Vec::with_capacity(names.len());
    for name in names {
        kinds.push(name.parse::<StrategyKind>()?);
    }
    Ok(kinds)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Silent by default; the report is the output
    if args.verbose {
        mafia_backend::telemetry::init_tracing();
    } else {
        tracing_subscriber::fmt().with_env_filter("warn").init();
    }

    let mut config = GameConfig::from_env()?;
    if let Some(url) = &args.redis_url {
        config.redis_url = Some(url.clone());
    }
    let scenario = Scenario {
        sessions: args.sessions.max(1),
        players: args.players.max(mafia_backend::domain::MIN_PLAYERS),
        latency: Duration::from_millis(args.latency_ms),
        seed: args.seed.unwrap_or_else(rand::random),
    };
    info!(
        sessions = scenario.sessions,
        players = scenario.players,
        seed = scenario.seed,
        redis = config.redis_url.is_some(),
        "Starting strategy bench"
    );

    let mut reports: Vec<StrategyReport> = Vec::new();
    for kind in selected_strategies(&args.strategy)? {
        match run_scenario(&config, kind, &scenario).await {
            Ok(report) => reports.push(report),
            Err(e) => warn!(strategy = %kind, error = %e, "Strategy run failed"),
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_table(&reports);
    }
    Ok(())
}
