use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::concurrency::StrategyKind;
use crate::error::AppError;

/// Per-phase durations of one game day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDurations {
    pub discussion: Duration,
    pub voting: Duration,
    pub defense: Duration,
    pub final_voting: Duration,
    pub night: Duration,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            discussion: Duration::from_secs(60),
            voting: Duration::from_secs(30),
            defense: Duration::from_secs(20),
            final_voting: Duration::from_secs(20),
            night: Duration::from_secs(30),
        }
    }
}

/// Bounded retry for the optimistic strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimisticSettings {
    pub max_retries: u32,
    /// Base delay; doubles per attempt, jittered
    pub backoff: Duration,
}

impl Default for OptimisticSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Polling bounds for the spin lock strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinSettings {
    pub max_retries: u32,
    pub interval: Duration,
    pub lease: Duration,
}

impl Default for SpinSettings {
    fn default() -> Self {
        Self {
            max_retries: 50,
            interval: Duration::from_millis(100),
            lease: Duration::from_secs(10),
        }
    }
}

/// Everything the session manager needs at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// `None` selects the in-memory backends
    pub redis_url: Option<String>,
    pub strategy: StrategyKind,
    pub optimistic: OptimisticSettings,
    /// Wait bound for the pessimistic and wait-queue strategies
    pub lock_wait: Duration,
    /// Lease for the wait-queue strategy; the watchdog renews every lease/3
    pub lock_lease: Duration,
    pub spin: SpinSettings,
    pub session_ttl: Duration,
    pub aggregate_ttl: Duration,
    pub ended_retention: Duration,
    pub phases: PhaseDurations,
    pub extension: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            strategy: StrategyKind::Atomic,
            optimistic: OptimisticSettings::default(),
            lock_wait: Duration::from_millis(5000),
            lock_lease: Duration::from_millis(30_000),
            spin: SpinSettings::default(),
            session_ttl: Duration::from_secs(86_400),
            aggregate_ttl: Duration::from_secs(1800),
            ended_retention: Duration::from_secs(600),
            phases: PhaseDurations::default(),
            extension: Duration::from_secs(15),
        }
    }
}

impl GameConfig {
    /// Load from `GAME_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let redis_url = lookup("GAME_REDIS_URL").filter(|url| !url.trim().is_empty());

        let strategy = match lookup("GAME_LOCK_STRATEGY") {
            Some(name) => StrategyKind::from_str(name.trim())?,
            None => d.strategy,
        };

        let optimistic = OptimisticSettings {
            max_retries: parse_var(
                &lookup,
                "GAME_OPTIMISTIC_MAX_RETRIES",
                d.optimistic.max_retries,
            )?,
            backoff: millis_var(&lookup, "GAME_OPTIMISTIC_BACKOFF_MS", d.optimistic.backoff)?,
        };
        let spin = SpinSettings {
            max_retries: parse_var(&lookup, "GAME_SPIN_MAX_RETRIES", d.spin.max_retries)?,
            interval: millis_var(&lookup, "GAME_SPIN_INTERVAL_MS", d.spin.interval)?,
            lease: millis_var(&lookup, "GAME_SPIN_LEASE_MS", d.spin.lease)?,
        };
        let phases = PhaseDurations {
            discussion: secs_var(&lookup, "GAME_DISCUSSION_SECS", d.phases.discussion)?,
            voting: secs_var(&lookup, "GAME_VOTING_SECS", d.phases.voting)?,
            defense: secs_var(&lookup, "GAME_DEFENSE_SECS", d.phases.defense)?,
            final_voting: secs_var(&lookup, "GAME_FINAL_VOTING_SECS", d.phases.final_voting)?,
            night: secs_var(&lookup, "GAME_NIGHT_SECS", d.phases.night)?,
        };

        let config = Self {
            redis_url,
            strategy,
            optimistic,
            lock_wait: millis_var(&lookup, "GAME_LOCK_WAIT_MS", d.lock_wait)?,
            lock_lease: millis_var(&lookup, "GAME_LOCK_LEASE_MS", d.lock_lease)?,
            spin,
            session_ttl: secs_var(&lookup, "GAME_SESSION_TTL_SECS", d.session_ttl)?,
            aggregate_ttl: secs_var(&lookup, "GAME_AGGREGATE_TTL_SECS", d.aggregate_ttl)?,
            ended_retention: secs_var(&lookup, "GAME_ENDED_RETENTION_SECS", d.ended_retention)?,
            phases,
            extension: secs_var(&lookup, "GAME_EXTENSION_SECS", d.extension)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.lock_lease < Duration::from_millis(3) {
            return Err(AppError::config(
                "GAME_LOCK_LEASE_MS must be at least 3ms so the watchdog can renew it",
            ));
        }
        if self.spin.max_retries == 0 {
            return Err(AppError::config("GAME_SPIN_MAX_RETRIES must be positive"));
        }
        let p = &self.phases;
        for (name, d) in [
            ("GAME_DISCUSSION_SECS", p.discussion),
            ("GAME_VOTING_SECS", p.voting),
            ("GAME_DEFENSE_SECS", p.defense),
            ("GAME_FINAL_VOTING_SECS", p.final_voting),
            ("GAME_NIGHT_SECS", p.night),
        ] {
            if d.is_zero() {
                return Err(AppError::config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            AppError::config(format!(
                "Environment variable '{name}' has invalid value '{raw}'"
            ))
        }),
    }
}

fn millis_var<F>(lookup: &F, name: &str, default: Duration) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_var(lookup, name, default_ms).map(Duration::from_millis)
}

fn secs_var<F>(lookup: &F, name: &str, default: Duration) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_var(lookup, name, default.as_secs()).map(Duration::from_secs)
}
