use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::SessionManager;
use crate::broadcast::GameEvent;
use crate::domain::{
    derive_session_transitions, next_phase, Phase, PhaseTicket, Session, SessionTransition, Status,
    SubmissionKind,
};
use crate::error::AppError;
use crate::services::phase_timer::PhaseAdvancer;

/// What one call to [`SessionManager::force_advance`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Left `from`, now in `to`.
    Advanced { from: PhaseTicket, to: PhaseTicket },
    /// Left `from` and the game ended.
    Ended { from: PhaseTicket },
    /// The session was no longer in the expected phase (or is gone).
    Stale,
}

impl SessionManager {
    /// Leave `expected` if the session is still in it.
    ///
    /// Administrative path into the same guarded transition the phase timer
    /// uses; it ignores the deadline.
    pub async fn force_advance(
        &self,
        game_id: &str,
        expected: PhaseTicket,
    ) -> Result<AdvanceOutcome, AppError> {
        self.advance_guarded(game_id, expected, None).await
    }

    /// The single transition entry point. With `due` set, a session whose
    /// deadline has since moved past `due` is left alone.
    async fn advance_guarded(
        &self,
        game_id: &str,
        expected: PhaseTicket,
        due: Option<OffsetDateTime>,
    ) -> Result<AdvanceOutcome, AppError> {
        let gate = self.lock_session(game_id).await?;

        let Some(before) = self.sessions.get(game_id).await? else {
            debug!(game_id, %expected, "Advance for a missing session ignored");
            self.release_gate(game_id, gate);
            return Ok(AdvanceOutcome::Stale);
        };
        if before.status != Status::InProgress || before.ticket() != expected {
            debug!(
                game_id,
                %expected,
                current = %before.ticket(),
                status = ?before.status,
                "Stale advance ignored"
            );
            return Ok(AdvanceOutcome::Stale);
        }
        if let (Some(due), Some(ends_at)) = (due, before.phase_ends_at) {
            if ends_at > due {
                debug!(game_id, %expected, %due, %ends_at, "Deadline moved; timer ignored");
                return Ok(AdvanceOutcome::Stale);
            }
        }

        let mut after = before.clone();
        let exit = self.run_exit(&mut after).await?;

        if !after.is_ended() {
            let (phase, day) = next_phase(after.phase, after.day, after.defendant.is_some());
            self.enter_phase(&mut after, phase, day).await;
        }

        self.sessions
            .set(game_id, &after, self.session_ttl(&after))
            .await?;

        // only now is the outcome durable
        if let Some(kind) = exit.consumed {
            self.clear_submissions(game_id, kind).await;
        }
        if after.is_ended() {
            self.timer.cancel(game_id);
            self.clear_all_submissions(game_id).await;
        } else if let Some(ends_at) = after.phase_ends_at {
            self.timer.schedule(game_id, after.ticket(), ends_at);
        }

        for event in &exit.events {
            self.announce(&after.room_id, event).await;
        }
        self.announce_transitions(&before, &after).await;

        let outcome = if after.is_ended() {
            self.release_gate(game_id, gate);
            AdvanceOutcome::Ended { from: expected }
        } else {
            AdvanceOutcome::Advanced {
                from: expected,
                to: after.ticket(),
            }
        };
        info!(game_id, from = %expected, outcome = ?outcome, "Phase advanced");
        Ok(outcome)
    }

    /// Move `session` into `phase` of `day` with a fresh deadline. The phase's
    /// submission aggregate is cleared on entry.
    pub(super) async fn enter_phase(&self, session: &mut Session, phase: Phase, day: u32) {
        if phase == Phase::DayDiscussion {
            session.defendant = None;
            session.extensions_used.clear();
        }
        session.phase = phase;
        session.day = day;
        session.phase_ends_at = Some(phase_deadline(phase.duration(&self.config.phases)));

        if let Some(kind) = phase.submission_kind() {
            self.clear_submissions(&session.game_id, kind).await;
        }
    }

    pub(super) async fn clear_submissions(&self, game_id: &str, kind: SubmissionKind) {
        let key = kind.aggregate_key(game_id);
        if let Err(err) = self.aggregates.delete(&key).await {
            warn!(game_id, key = %key, error = %err, "Failed to clear submissions");
        }
    }

    pub(super) async fn clear_all_submissions(&self, game_id: &str) {
        for kind in SubmissionKind::ALL {
            self.clear_submissions(game_id, kind).await;
        }
    }

    /// Room announcements for the edges between two snapshots.
    pub(super) async fn announce_transitions(&self, before: &Session, after: &Session) {
        for transition in derive_session_transitions(before, after) {
            let event = match transition {
                SessionTransition::PhaseChanged { day, phase } => GameEvent::PhaseChanged {
                    game_id: after.game_id.clone(),
                    day,
                    phase,
                    ends_at: after.phase_ends_at,
                },
                SessionTransition::GameEnded { winner } => GameEvent::GameEnded {
                    game_id: after.game_id.clone(),
                    winner,
                },
                SessionTransition::GameStarted => {
                    info!(game_id = %after.game_id, players = after.players.len(), "Game started");
                    continue;
                }
                SessionTransition::PlayerEliminated { player_id } => {
                    // announced through the vote or night result
                    info!(game_id = %after.game_id, player_id = %player_id, "Player eliminated");
                    continue;
                }
            };
            self.announce(&after.room_id, &event).await;
        }
    }
}

#[async_trait]
impl PhaseAdvancer for SessionManager {
    async fn advance_phase(
        &self,
        game_id: &str,
        expected: PhaseTicket,
        due: OffsetDateTime,
    ) -> Result<(), AppError> {
        self.advance_guarded(game_id, expected, Some(due))
            .await
            .map(|_| ())
    }
}

pub(super) fn phase_deadline(duration: std::time::Duration) -> OffsetDateTime {
    OffsetDateTime::now_utc() + duration
}
