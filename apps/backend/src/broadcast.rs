//! Outbound announcements to rooms and individual players.
//!
//! Delivery is best effort: callers log a failed send and carry on, a
//! transition is never rolled back because nobody heard about it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

use crate::domain::{Phase, PlayerId, Team};
use crate::error::AppError;
use crate::infra::redis::publish_with_retry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    PhaseChanged {
        game_id: String,
        day: u32,
        phase: Phase,
        #[serde(with = "time::serde::rfc3339::option")]
        ends_at: Option<OffsetDateTime>,
    },
    DiscussionExtended {
        game_id: String,
        player_id: PlayerId,
        #[serde(with = "time::serde::rfc3339::option")]
        ends_at: Option<OffsetDateTime>,
    },
    VoteResult {
        game_id: String,
        day: u32,
        counts: BTreeMap<PlayerId, usize>,
        /// `None` when the vote was void
        defendant: Option<PlayerId>,
    },
    FinalVoteResult {
        game_id: String,
        day: u32,
        defendant: Option<PlayerId>,
        agree: usize,
        disagree: usize,
        eliminated: bool,
    },
    NightResult {
        game_id: String,
        day: u32,
        killed: Option<PlayerId>,
    },
    /// Private to the investigating police officer.
    PoliceInvestigation {
        game_id: String,
        target_id: PlayerId,
        target_name: String,
        is_mafia: bool,
    },
    GameEnded {
        game_id: String,
        winner: Option<Team>,
    },
}

impl GameEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::PhaseChanged { .. } => "phase_changed",
            GameEvent::DiscussionExtended { .. } => "discussion_extended",
            GameEvent::VoteResult { .. } => "vote_result",
            GameEvent::FinalVoteResult { .. } => "final_vote_result",
            GameEvent::NightResult { .. } => "night_result",
            GameEvent::PoliceInvestigation { .. } => "police_investigation",
            GameEvent::GameEnded { .. } => "game_ended",
        }
    }
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn send_to_room(&self, room_id: &str, event: &GameEvent) -> Result<(), AppError>;

    async fn send_to_user(&self, user_id: &str, event: &GameEvent) -> Result<(), AppError>;
}

/// Publishes JSON envelopes on `room:{id}` and `user:{id}`.
pub struct RedisBroadcaster {
    publisher: ConnectionManager,
}

impl RedisBroadcaster {
    pub fn new(publisher: ConnectionManager) -> Self {
        Self { publisher }
    }

    async fn publish(&self, channel: String, event: &GameEvent) -> Result<(), AppError> {
        let encoded = serde_json::to_string(event)
            .map_err(|err| AppError::internal(format!("Failed to serialize game event: {err}")))?;
        publish_with_retry(&self.publisher, &channel, &encoded).await
    }
}

#[async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn send_to_room(&self, room_id: &str, event: &GameEvent) -> Result<(), AppError> {
        self.publish(format!("room:{room_id}"), event).await
    }

    async fn send_to_user(&self, user_id: &str, event: &GameEvent) -> Result<(), AppError> {
        self.publish(format!("user:{user_id}"), event).await
    }
}

/// Logs events instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBroadcaster;

#[async_trait]
impl Broadcaster for TracingBroadcaster {
    async fn send_to_room(&self, room_id: &str, event: &GameEvent) -> Result<(), AppError> {
        info!(room_id, event = event.kind(), payload = ?event, "room broadcast");
        Ok(())
    }

    async fn send_to_user(&self, user_id: &str, event: &GameEvent) -> Result<(), AppError> {
        info!(user_id, event = event.kind(), "private message");
        Ok(())
    }
}
