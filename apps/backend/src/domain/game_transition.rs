// apps/backend/src/domain/game_transition.rs

use crate::domain::phase::Phase;
use crate::domain::roles::Team;
use crate::domain::session::{PlayerId, Session, Status};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    /// Edge-triggered: Waiting -> InProgress
    GameStarted,

    /// Edge-triggered: the (day, phase) ticket changed.
    PhaseChanged { day: u32, phase: Phase },

    /// Edge-triggered: a player went from alive to dead.
    PlayerEliminated { player_id: PlayerId },

    /// Edge-triggered: !Ended -> Ended
    GameEnded { winner: Option<Team> },
}

/// Derive transitions from before/after snapshots of one session.
///
/// Order is stable: start, eliminations (seat order), end, then phase change.
/// An ended game reports no phase change.
pub fn derive_session_transitions(before: &Session, after: &Session) -> Vec<SessionTransition> {
    let mut transitions = Vec::new();

    // 1. Start
    if before.status == Status::Waiting && after.status == Status::InProgress {
        transitions.push(SessionTransition::GameStarted);
    }

    // 2. Eliminations
    for player in &after.players {
        if !player.alive && before.is_alive(&player.id) {
            transitions.push(SessionTransition::PlayerEliminated {
                player_id: player.id.clone(),
            });
        }
    }

    // 3. End
    if before.status != Status::Ended && after.status == Status::Ended {
        transitions.push(SessionTransition::GameEnded {
            winner: after.winner,
        });
        return transitions;
    }

    // 4. Phase
    if after.status == Status::InProgress && before.ticket() != after.ticket() {
        transitions.push(SessionTransition::PhaseChanged {
            day: after.day,
            phase: after.phase,
        });
    }

    transitions
}
