//! Per-strategy results and their rendering.

use std::collections::BTreeMap;
use std::time::Duration;

use mafia_backend::{AppError, MutationReceipt, StrategyKind};
use serde::Serialize;

/// Outcome of one submitted vote.
#[derive(Debug)]
pub struct VoteSample {
    pub latency: Duration,
    /// Strategy attempts on success, error code on failure
    pub outcome: Result<u32, &'static str>,
}

impl VoteSample {
    pub fn new(latency: Duration, result: Result<MutationReceipt, AppError>) -> Self {
        let outcome = result
            .map(|receipt| receipt.attempts)
            .map_err(|e| e.code().as_str());
        Self { latency, outcome }
    }
}

#[derive(Debug, Serialize)]
pub struct StrategyReport {
    pub strategy: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: BTreeMap<String, usize>,
    /// Votes found in the aggregates afterwards
    pub recorded: usize,
    /// Reported successes missing from the aggregates
    pub lost_updates: usize,
    /// Store attempts across successful votes (retries included)
    pub total_attempts: u64,
    pub p50_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub wall_ms: f64,
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[Duration], pct: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

impl StrategyReport {
    pub fn from_samples(
        kind: StrategyKind,
        samples: &[VoteSample],
        recorded: usize,
        wall: Duration,
    ) -> Self {
        let mut failed: BTreeMap<String, usize> = BTreeMap::new();
        let mut succeeded = 0;
        let mut total_attempts = 0u64;
        for sample in samples {
            match sample.outcome {
                Ok(attempts) => {
                    succeeded += 1;
                    total_attempts += u64::from(attempts);
                }
                Err(code) => *failed.entry(code.to_string()).or_insert(0) += 1,
            }
        }

        let mut latencies: Vec<Duration> = samples.iter().map(|s| s.latency).collect();
        latencies.sort();

        Self {
            strategy: kind.as_str().to_string(),
            attempted: samples.len(),
            succeeded,
            failed,
            recorded,
            lost_updates: succeeded.saturating_sub(recorded),
            total_attempts,
            p50_ms: millis(percentile(&latencies, 50.0)),
            p99_ms: millis(percentile(&latencies, 99.0)),
            max_ms: millis(latencies.last().copied().unwrap_or_default()),
            wall_ms: millis(wall),
        }
    }
}

pub fn print_table(reports: &[StrategyReport]) {
    println!("\n=== Strategy Bench ===");
    println!(
        "{:<12} {:>9} {:>9} {:>9} {:>6} {:>9} {:>9} {:>9} {:>9}  failures",
        "strategy",
        "attempted",
        "succeeded",
        "recorded",
        "lost",
        "p50 ms",
        "p99 ms",
        "max ms",
        "wall ms"
    );
    for r in reports {
        let failures = if r.failed.is_empty() {
            "-".to_string()
        } else {
            r.failed
                .iter()
                .map(|(code, n)| format!("{code}={n}"))
                .collect::<Vec<_>>()
                .join(",")
        };
        println!(
            "{:<12} {:>9} {:>9} {:>9} {:>6} {:>9.2} {:>9.2} {:>9.2} {:>9.1}  {}",
            r.strategy,
            r.attempted,
            r.succeeded,
            r.recorded,
            r.lost_updates,
            r.p50_ms,
            r.p99_ms,
            r.max_ms,
            r.wall_ms,
            failures
        );
    }
}
