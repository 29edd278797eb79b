//! Phase exit handlers: turn the recorded submissions into outcomes.

use std::collections::BTreeMap;

use tracing::{info, warn};

use super::SessionManager;
use crate::broadcast::GameEvent;
use crate::domain::tally::{
    check_winner, count_targets, resolve_night, tally_final_votes, unique_top,
};
use crate::domain::{Aggregate, ExitAction, Session, Status, SubmissionKind};
use crate::error::AppError;

/// Result announcements of one phase exit, and the aggregate it read.
pub(super) struct PhaseExit {
    pub events: Vec<GameEvent>,
    /// Cleared by the caller once the new session state is stored.
    pub consumed: Option<SubmissionKind>,
}

impl PhaseExit {
    fn quiet() -> Self {
        Self {
            events: Vec::new(),
            consumed: None,
        }
    }

    fn resolved(event: GameEvent, kind: SubmissionKind) -> Self {
        Self {
            events: vec![event],
            consumed: Some(kind),
        }
    }
}

impl SessionManager {
    /// Apply the exit behavior of the session's current phase; phase
    /// bookkeeping is the caller's.
    ///
    /// Submissions are read, not removed: if the session write that follows
    /// fails, a retried transition resolves from the same records.
    pub(super) async fn run_exit(&self, session: &mut Session) -> Result<PhaseExit, AppError> {
        let exit = match session.phase.exit_action() {
            ExitAction::ClearExtensions => {
                session.extensions_used.clear();
                PhaseExit::quiet()
            }
            ExitAction::Nothing => PhaseExit::quiet(),
            ExitAction::TallyVotes => {
                let votes = self.recorded(&session.game_id, SubmissionKind::Vote).await?;
                PhaseExit::resolved(self.tally_votes(session, &votes), SubmissionKind::Vote)
            }
            ExitAction::TallyFinalVotes => {
                let kind = SubmissionKind::FinalVote;
                let ballots = self.recorded(&session.game_id, kind).await?;
                let event = self.tally_final(session, &ballots);
                self.settle_winner(session);
                PhaseExit::resolved(event, kind)
            }
            ExitAction::ResolveNight => {
                let kind = SubmissionKind::NightAction;
                let actions = self.recorded(&session.game_id, kind).await?;
                let event = self.resolve_night_actions(session, &actions);
                self.settle_winner(session);
                PhaseExit::resolved(event, kind)
            }
        };
        Ok(exit)
    }

    async fn recorded(&self, game_id: &str, kind: SubmissionKind) -> Result<Aggregate, AppError> {
        let key = kind.aggregate_key(game_id);
        let loaded = self.aggregates.load(&key).await.inspect_err(|err| {
            warn!(
                game_id,
                key = %key,
                code = %err.code(),
                error = %err,
                "Reading submissions failed"
            );
        })?;
        Ok(loaded.value)
    }

    fn tally_votes(&self, session: &mut Session, votes: &Aggregate) -> GameEvent {
        let valid: Vec<(&str, &str)> = votes
            .iter()
            .filter(|(voter, target)| session.is_alive(voter) && session.is_alive(target))
            .map(|(voter, target)| (voter.as_str(), target.as_str()))
            .collect();
        let counts = count_targets(valid.iter().map(|(_, target)| *target));
        let defendant = unique_top(&counts);
        let counts: BTreeMap<String, usize> = counts
            .into_iter()
            .map(|(target, n)| (target.to_string(), n))
            .collect();

        for (voter, target) in &valid {
            if let Some(player) = session.player_mut(voter) {
                player.last_vote = Some((*target).to_string());
            }
        }
        session.defendant = defendant.clone();
        info!(
            game_id = %session.game_id,
            day = session.day,
            ballots = valid.len(),
            defendant = defendant.as_deref().unwrap_or("-"),
            "Votes tallied"
        );

        GameEvent::VoteResult {
            game_id: session.game_id.clone(),
            day: session.day,
            counts,
            defendant,
        }
    }

    fn tally_final(&self, session: &mut Session, ballots: &Aggregate) -> GameEvent {
        let defendant = session.defendant.take();
        let counted: Aggregate = ballots
            .iter()
            .filter(|(voter, _)| {
                session.is_alive(voter) && defendant.as_deref() != Some(voter.as_str())
            })
            .map(|(voter, choice)| (voter.clone(), choice.clone()))
            .collect();
        let tally = tally_final_votes(&counted);

        let mut eliminated = false;
        if let Some(id) = defendant.as_deref() {
            if tally.eliminates() {
                if let Some(player) = session.player_mut(id).filter(|p| p.alive) {
                    player.alive = false;
                    eliminated = true;
                }
            }
        }
        info!(
            game_id = %session.game_id,
            day = session.day,
            agree = tally.agree,
            disagree = tally.disagree,
            eliminated,
            "Final votes tallied"
        );

        GameEvent::FinalVoteResult {
            game_id: session.game_id.clone(),
            day: session.day,
            defendant,
            agree: tally.agree,
            disagree: tally.disagree,
            eliminated,
        }
    }

    fn resolve_night_actions(&self, session: &mut Session, actions: &Aggregate) -> GameEvent {
        let outcome = resolve_night(session, actions, &mut *self.rng.lock());
        if let Some(id) = outcome.killed.as_deref() {
            if let Some(player) = session.player_mut(id) {
                player.alive = false;
            }
        }
        info!(
            game_id = %session.game_id,
            day = session.day,
            mafia_target = outcome.mafia_target.as_deref().unwrap_or("-"),
            protected = outcome.protected.is_some(),
            killed = outcome.killed.as_deref().unwrap_or("-"),
            "Night resolved"
        );

        GameEvent::NightResult {
            game_id: session.game_id.clone(),
            day: session.day,
            killed: outcome.killed,
        }
    }

    /// End the game if a team has won. Ending is terminal.
    fn settle_winner(&self, session: &mut Session) {
        let Some(winner) = check_winner(session) else {
            return;
        };
        session.status = Status::Ended;
        session.winner = Some(winner);
        session.phase_ends_at = None;
        info!(game_id = %session.game_id, day = session.day, winner = ?winner, "Game over");
    }
}
