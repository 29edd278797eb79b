//! Error codes for the mafia backend.
//!
//! Every failure surfaced by a service carries one of these codes. Add new
//! codes here; never pass ad-hoc strings as error codes.
//!
//! All codes are SCREAMING_SNAKE_CASE and are the strings that appear in
//! logs (`code = ...`) and in bench reports.

use core::fmt;

/// Centralized error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    // Submission validation
    /// Submission kind does not match the current phase
    PhaseMismatch,
    /// Actor is dead
    ActorDead,
    /// Actor does not hold the role required for this action
    IneligibleRole,
    /// The defendant may not vote on their own fate
    DefendantCannotVote,
    /// Target is not an alive player of the session
    InvalidTarget,
    /// Final-vote choice is neither AGREE nor DISAGREE
    InvalidChoice,
    /// Session already ended
    GameEnded,
    /// Session is not in the status the operation requires
    InvalidStatus,
    /// Player list rejected at session creation
    InvalidPlayers,
    /// Discussion extension already used today
    ExtensionUsed,
    /// General validation error
    ValidationError,

    // Resource Not Found
    /// Session not found
    GameNotFound,
    /// Player not found in the session
    PlayerNotFound,

    // Concurrency
    /// Optimistic retries exhausted
    ConflictExhausted,
    /// Lock could not be acquired within the wait bound
    LockTimeout,
    /// Session id already in use
    GameExists,

    // System Errors
    /// Store transport or command failure
    StoreUnavailable,
    /// Stored data could not be decoded
    DataCorruption,
    /// Invalid configuration
    ConfigError,
    /// Internal error
    Internal,
}

impl ErrorCode {
    /// Returns the canonical SCREAMING_SNAKE_CASE string for this error code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            // Submission validation
            Self::PhaseMismatch => "PHASE_MISMATCH",
            Self::ActorDead => "ACTOR_DEAD",
            Self::IneligibleRole => "INELIGIBLE_ROLE",
            Self::DefendantCannotVote => "DEFENDANT_CANNOT_VOTE",
            Self::InvalidTarget => "INVALID_TARGET",
            Self::InvalidChoice => "INVALID_CHOICE",
            Self::GameEnded => "GAME_ENDED",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::InvalidPlayers => "INVALID_PLAYERS",
            Self::ExtensionUsed => "EXTENSION_USED",
            Self::ValidationError => "VALIDATION_ERROR",

            // Resource Not Found
            Self::GameNotFound => "GAME_NOT_FOUND",
            Self::PlayerNotFound => "PLAYER_NOT_FOUND",

            // Concurrency
            Self::ConflictExhausted => "CONFLICT_EXHAUSTED",
            Self::LockTimeout => "LOCK_TIMEOUT",
            Self::GameExists => "GAME_EXISTS",

            // System Errors
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::DataCorruption => "DATA_CORRUPTION",
            Self::ConfigError => "CONFIG_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    /// Every code, in declaration order.
    pub const ALL: [ErrorCode; 20] = [
        Self::PhaseMismatch,
        Self::ActorDead,
        Self::IneligibleRole,
        Self::DefendantCannotVote,
        Self::InvalidTarget,
        Self::InvalidChoice,
        Self::GameEnded,
        Self::InvalidStatus,
        Self::InvalidPlayers,
        Self::ExtensionUsed,
        Self::ValidationError,
        Self::GameNotFound,
        Self::PlayerNotFound,
        Self::ConflictExhausted,
        Self::LockTimeout,
        Self::GameExists,
        Self::StoreUnavailable,
        Self::DataCorruption,
        Self::ConfigError,
        Self::Internal,
    ];
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
