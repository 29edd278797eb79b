//! Unified test logging initialization
//!
//! Used by the unit tests inside `mafia-backend` (through its own
//! `test_bootstrap`) and by every integration suite binary.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Initialize structured logging for tests.
///
/// Idempotent and race-safe. The level comes from, in order:
///
/// 1. `TEST_LOG` (preferred)
/// 2. `RUST_LOG` (fallback)
/// 3. `"warn"` (default, quiet)
///
/// Scheduler and strategy logs are noisy at `debug`; run a single
/// suite with `TEST_LOG=mafia_backend=debug` when chasing a race.
pub fn init() {
    INITIALIZED.get_or_init(|| {
        let filter = std::env::var("TEST_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // cargo/nextest capture
            .without_time()
            .with_target(true)
            .try_init()
            .ok();
    });
}
