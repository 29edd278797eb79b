//! Session services: submissions, phase transitions, outcome resolution and
//! the per-session phase timer.

pub mod game_flow;
pub mod phase_timer;

pub use game_flow::{AdvanceOutcome, SessionManager, SessionManagerParts};
pub use phase_timer::{PhaseAdvancer, PhaseTimer};
