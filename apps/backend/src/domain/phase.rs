//! Phase table and the pure transition function.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PhaseDurations;

/// One timed stage of the day/night cycle, in cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Open talk; players may extend it once per day.
    DayDiscussion,
    /// Everyone alive names a suspect.
    DayVoting,
    /// The top-voted player pleads their case.
    DayFinalDefense,
    /// Agree/disagree on eliminating the defendant.
    DayFinalVoting,
    /// Mafia, doctor and police act in secret.
    NightAction,
}

/// What leaving a phase does to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    ClearExtensions,
    TallyVotes,
    Nothing,
    TallyFinalVotes,
    ResolveNight,
}

/// The three submission sets; each lives under its own aggregate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionKind {
    Vote,
    FinalVote,
    NightAction,
}

impl SubmissionKind {
    pub const ALL: [SubmissionKind; 3] = [Self::Vote, Self::FinalVote, Self::NightAction];

    /// The only phase accepting this kind.
    pub const fn phase(self) -> Phase {
        match self {
            Self::Vote => Phase::DayVoting,
            Self::FinalVote => Phase::DayFinalVoting,
            Self::NightAction => Phase::NightAction,
        }
    }

    pub fn aggregate_key(self, game_id: &str) -> String {
        match self {
            Self::Vote => format!("game:votes:{game_id}"),
            Self::FinalVote => format!("game:finalvotes:{game_id}"),
            Self::NightAction => format!("game:nightactions:{game_id}"),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vote => "vote",
            Self::FinalVote => "final_vote",
            Self::NightAction => "night_action",
        }
    }
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::DayDiscussion => "DAY_DISCUSSION",
            Phase::DayVoting => "DAY_VOTING",
            Phase::DayFinalDefense => "DAY_FINAL_DEFENSE",
            Phase::DayFinalVoting => "DAY_FINAL_VOTING",
            Phase::NightAction => "NIGHT_ACTION",
        }
    }

    pub fn duration(self, durations: &PhaseDurations) -> Duration {
        match self {
            Phase::DayDiscussion => durations.discussion,
            Phase::DayVoting => durations.voting,
            Phase::DayFinalDefense => durations.defense,
            Phase::DayFinalVoting => durations.final_voting,
            Phase::NightAction => durations.night,
        }
    }

    pub const fn exit_action(self) -> ExitAction {
        match self {
            Phase::DayDiscussion => ExitAction::ClearExtensions,
            Phase::DayVoting => ExitAction::TallyVotes,
            Phase::DayFinalDefense => ExitAction::Nothing,
            Phase::DayFinalVoting => ExitAction::TallyFinalVotes,
            Phase::NightAction => ExitAction::ResolveNight,
        }
    }

    /// Submission set collected during this phase, if any.
    pub const fn submission_kind(self) -> Option<SubmissionKind> {
        match self {
            Phase::DayVoting => Some(SubmissionKind::Vote),
            Phase::DayFinalVoting => Some(SubmissionKind::FinalVote),
            Phase::NightAction => Some(SubmissionKind::NightAction),
            Phase::DayDiscussion | Phase::DayFinalDefense => None,
        }
    }
}

/// Next `(phase, day)` after `current` has exited.
///
/// `has_defendant` is the outcome of the voting tally; it only matters when
/// leaving DAY_VOTING.
pub fn next_phase(current: Phase, day: u32, has_defendant: bool) -> (Phase, u32) {
    match current {
        Phase::DayDiscussion => (Phase::DayVoting, day),
        Phase::DayVoting if has_defendant => (Phase::DayFinalDefense, day),
        Phase::DayVoting => (Phase::NightAction, day),
        Phase::DayFinalDefense => (Phase::DayFinalVoting, day),
        Phase::DayFinalVoting => (Phase::NightAction, day),
        Phase::NightAction => (Phase::DayDiscussion, day + 1),
    }
}
