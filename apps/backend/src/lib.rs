#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

pub mod broadcast;
pub mod concurrency;
pub mod config;
pub mod domain;
pub mod error;
pub mod errors;
pub mod infra;
pub mod lock;
pub mod services;
pub mod state;
pub mod store;
pub mod telemetry;

#[cfg(test)]
pub mod test_bootstrap;

// Re-exports for public API
pub use broadcast::{Broadcaster, GameEvent, RedisBroadcaster, TracingBroadcaster};
pub use concurrency::{
    AggregateMutation, ConcurrencyStrategy, MutationReceipt, StrategyFactory, StrategyKind,
};
pub use config::GameConfig;
pub use error::AppError;
pub use errors::ErrorCode;
pub use services::{AdvanceOutcome, SessionManager, SessionManagerParts};
pub use state::AppState;

// Prelude for test convenience
pub mod prelude {
    pub use super::broadcast::{Broadcaster, GameEvent};
    pub use super::concurrency::{AggregateMutation, ConcurrencyStrategy, StrategyKind};
    pub use super::config::GameConfig;
    pub use super::domain::{
        Phase, PhaseTicket, Player, Role, RoleOptions, Session, Status, SubmissionKind, Team,
    };
    pub use super::error::AppError;
    pub use super::errors::ErrorCode;
    pub use super::services::{AdvanceOutcome, SessionManager};
    pub use super::state::AppState;
}

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    test_bootstrap::logging::init();
}
