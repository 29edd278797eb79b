//! Session manager: the one owner of a session's lifecycle.
//!
//! Submissions go through the configured concurrency strategy into the
//! per-kind aggregates. Phase transitions (timer, force-advance, extension,
//! start) are serialized per session in this process and guarded by the
//! `(day, phase)` ticket, so a late timer is a no-op.

mod lifecycle;
mod resolution;
mod submissions;
mod transitions;

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

use crate::broadcast::{Broadcaster, GameEvent};
use crate::concurrency::ConcurrencyStrategy;
use crate::config::GameConfig;
use crate::domain::{PhaseTicket, RoleAssigner, Session, SubmissionKind};
use crate::error::AppError;
use crate::errors::domain::{DomainError, NotFoundKind};
use crate::services::phase_timer::{PhaseAdvancer, PhaseTimer};
use crate::store::{AggregateStore, SessionStore};

pub use transitions::AdvanceOutcome;

/// Everything a [`SessionManager`] is wired from.
pub struct SessionManagerParts {
    pub sessions: Arc<dyn SessionStore>,
    pub aggregates: Arc<dyn AggregateStore>,
    pub strategy: Arc<dyn ConcurrencyStrategy>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub roles: Arc<dyn RoleAssigner>,
    /// Tie-breaks at resolution. Seed it for reproducible games.
    pub rng: ChaCha8Rng,
}

pub struct SessionManager {
    sessions: Arc<dyn SessionStore>,
    aggregates: Arc<dyn AggregateStore>,
    strategy: Arc<dyn ConcurrencyStrategy>,
    broadcaster: Arc<dyn Broadcaster>,
    roles: Arc<dyn RoleAssigner>,
    rng: Mutex<ChaCha8Rng>,
    timer: PhaseTimer,
    gates: DashMap<String, Arc<AsyncMutex<()>>>,
    config: GameConfig,
}

impl SessionManager {
    pub fn new(parts: SessionManagerParts, config: GameConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<SessionManager>| {
            let target: Weak<dyn PhaseAdvancer> = weak.clone();
            Self {
                sessions: parts.sessions,
                aggregates: parts.aggregates,
                strategy: parts.strategy,
                broadcaster: parts.broadcaster,
                roles: parts.roles,
                rng: Mutex::new(parts.rng),
                timer: PhaseTimer::new(target),
                gates: DashMap::new(),
                config,
            }
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn strategy(&self) -> &Arc<dyn ConcurrencyStrategy> {
        &self.strategy
    }

    /// Ticket of the pending phase timer for `game_id`.
    pub fn pending_timer(&self, game_id: &str) -> Option<PhaseTicket> {
        self.timer.pending(game_id)
    }

    /// Current authoritative session document.
    pub async fn snapshot(&self, game_id: &str) -> Result<Session, AppError> {
        self.require_session(game_id).await
    }

    /// Current content of one submission aggregate.
    pub async fn submissions(
        &self,
        game_id: &str,
        kind: SubmissionKind,
    ) -> Result<crate::domain::Aggregate, AppError> {
        Ok(self.aggregates.load(&kind.aggregate_key(game_id)).await?.value)
    }

    async fn require_session(&self, game_id: &str) -> Result<Session, AppError> {
        self.sessions.get(game_id).await?.ok_or_else(|| {
            DomainError::not_found(NotFoundKind::Game, format!("game {game_id} not found")).into()
        })
    }

    /// Exclusive right to rewrite `game_id`'s session document in this process.
    async fn lock_session(&self, game_id: &str) -> Result<OwnedMutexGuard<()>, AppError> {
        let gate = self
            .gates
            .entry(game_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let wait = self.config.lock_wait;
        tokio::time::timeout(wait, gate.lock_owned())
            .await
            .map_err(|_| AppError::lock_timeout(format!("session:{game_id}"), wait))
    }

    /// Give up the gate and forget it unless someone else is queued on it.
    fn release_gate(&self, game_id: &str, gate: OwnedMutexGuard<()>) {
        drop(gate);
        self.gates
            .remove_if(game_id, |_, gate| Arc::strong_count(gate) == 1);
    }

    fn session_ttl(&self, session: &Session) -> Duration {
        if session.is_ended() {
            self.config.ended_retention
        } else {
            self.config.session_ttl
        }
    }

    async fn announce(&self, room_id: &str, event: &GameEvent) {
        if let Err(err) = self.broadcaster.send_to_room(room_id, event).await {
            warn!(room_id, event = event.kind(), error = %err, "Room broadcast failed");
        }
    }

    async fn whisper(&self, user_id: &str, event: &GameEvent) {
        if let Err(err) = self.broadcaster.send_to_user(user_id, event).await {
            warn!(user_id, event = event.kind(), error = %err, "Private message failed");
        }
    }
}
