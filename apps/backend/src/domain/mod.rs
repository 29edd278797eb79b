//! Domain layer: pure game rules, no I/O.

pub mod game_transition;
pub mod phase;
pub mod roles;
pub mod rules;
pub mod session;
pub mod tally;

// Re-exports for ergonomics
pub use game_transition::{derive_session_transitions, SessionTransition};
pub use phase::{next_phase, ExitAction, Phase, SubmissionKind};
pub use roles::{FixedRoleAssigner, Role, RoleAssigner, RoleOptions, ShuffledRoleAssigner, Team};
pub use session::{GameId, PhaseTicket, Player, PlayerId, Session, Status, MIN_PLAYERS};
pub use tally::{Aggregate, FinalChoice, FinalTally, NightOutcome};
