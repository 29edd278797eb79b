use std::collections::HashSet;

use time::OffsetDateTime;
use tracing::{debug, info};

use super::SessionManager;
use crate::broadcast::GameEvent;
use crate::domain::rules::validate_extension;
use crate::domain::{Phase, Player, RoleOptions, Session, Status, MIN_PLAYERS};
use crate::error::AppError;
use crate::errors::domain::{ConflictKind, DomainError, ValidationKind};

impl SessionManager {
    /// Create a WAITING session. Player ids must be unique.
    pub async fn create_session(
        &self,
        game_id: &str,
        room_id: &str,
        players: Vec<Player>,
    ) -> Result<Session, AppError> {
        if players.len() < MIN_PLAYERS {
            return Err(DomainError::validation(
                ValidationKind::InvalidPlayers,
                format!("need at least {MIN_PLAYERS} players, got {}", players.len()),
            )
            .into());
        }
        let mut seen = HashSet::with_capacity(players.len());
        if let Some(dup) = players.iter().find(|p| !seen.insert(p.id.as_str())) {
            return Err(DomainError::validation(
                ValidationKind::InvalidPlayers,
                format!("player {} is listed twice", dup.id),
            )
            .into());
        }

        let session = Session::new(game_id, room_id, players);
        if !self
            .sessions
            .insert_new(game_id, &session, self.config.session_ttl)
            .await?
        {
            return Err(DomainError::conflict(
                ConflictKind::GameExists,
                format!("game {game_id} already exists"),
            )
            .into());
        }
        info!(game_id, room_id, players = session.players.len(), "Session created");
        Ok(session)
    }

    /// Assign roles and open day 1's discussion. Only from WAITING.
    pub async fn start_game(
        &self,
        game_id: &str,
        options: &RoleOptions,
    ) -> Result<Session, AppError> {
        let _gate = self.lock_session(game_id).await?;
        let before = self.require_session(game_id).await?;
        if before.status != Status::Waiting {
            return Err(DomainError::validation(
                ValidationKind::InvalidStatus,
                format!("game {game_id} has already started"),
            )
            .into());
        }

        let roles = self.roles.assign(before.players.len(), options)?;
        let mut after = before.clone();
        for (player, role) in after.players.iter_mut().zip(roles) {
            player.role = Some(role);
            player.alive = true;
            player.last_vote = None;
        }
        after.status = Status::InProgress;
        self.clear_all_submissions(game_id).await;
        self.enter_phase(&mut after, Phase::DayDiscussion, 1).await;

        self.sessions
            .set(game_id, &after, self.config.session_ttl)
            .await?;
        if let Some(ends_at) = after.phase_ends_at {
            self.timer.schedule(game_id, after.ticket(), ends_at);
        }
        self.announce_transitions(&before, &after).await;
        Ok(after)
    }

    /// Push today's discussion deadline back; each alive player may do this
    /// once per day. Returns the new deadline.
    pub async fn extend_discussion(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> Result<OffsetDateTime, AppError> {
        let _gate = self.lock_session(game_id).await?;
        let mut session = self.require_session(game_id).await?;
        validate_extension(&session, player_id)?;

        let base = session
            .phase_ends_at
            .unwrap_or_else(OffsetDateTime::now_utc);
        let ends_at = base + self.config.extension;
        session.phase_ends_at = Some(ends_at);
        session.extensions_used.insert(player_id.to_string());

        self.sessions
            .set(game_id, &session, self.config.session_ttl)
            .await?;
        self.timer.schedule(game_id, session.ticket(), ends_at);
        debug!(game_id, player_id, %ends_at, "Discussion extended");

        let event = GameEvent::DiscussionExtended {
            game_id: game_id.to_string(),
            player_id: player_id.to_string(),
            ends_at: Some(ends_at),
        };
        self.announce(&session.room_id, &event).await;
        Ok(ends_at)
    }

    /// Whether `player_id` may chat in `game_id` right now.
    pub async fn can_player_chat(&self, game_id: &str, player_id: &str) -> Result<bool, AppError> {
        Ok(self.require_session(game_id).await?.can_player_chat(player_id))
    }

    /// Forget a session: timer, submissions and the document itself.
    pub async fn evict(&self, game_id: &str) -> Result<(), AppError> {
        let gate = self.lock_session(game_id).await?;
        self.timer.cancel(game_id);
        self.clear_all_submissions(game_id).await;
        self.sessions.delete(game_id).await?;
        info!(game_id, "Session evicted");
        self.release_gate(game_id, gate);
        Ok(())
    }
}
