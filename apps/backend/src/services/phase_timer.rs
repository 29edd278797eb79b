//! One pending phase transition per session.
//!
//! A timer is keyed by the absolute phase end time. Scheduling replaces any
//! earlier timer for the same session inside a single map entry, so two timers
//! for one session are never live together. A timer that fires removes itself
//! from the map before calling back, which keeps a reschedule issued from
//! inside the callback from aborting the task that is running it. Past that
//! point a reschedule can no longer reach it, so the callback is handed the
//! deadline it fired for and must ignore it once the session's deadline moved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::domain::PhaseTicket;
use crate::error::AppError;

/// Retries after the first failed transition attempt.
pub const TRANSITION_RETRIES: u32 = 3;
pub const TRANSITION_RETRY_SPACING: Duration = Duration::from_secs(1);

/// What a timer calls when it fires.
#[async_trait]
pub trait PhaseAdvancer: Send + Sync + 'static {
    /// Leave `expected` if the session is still in it and its deadline is
    /// still `due`. Anything else is a no-op, not an error.
    async fn advance_phase(
        &self,
        game_id: &str,
        expected: PhaseTicket,
        due: OffsetDateTime,
    ) -> Result<(), AppError>;
}

struct PendingTimer {
    generation: u64,
    ticket: PhaseTicket,
    task: JoinHandle<()>,
}

type TimerMap = Arc<DashMap<String, PendingTimer>>;

pub struct PhaseTimer {
    target: Weak<dyn PhaseAdvancer>,
    timers: TimerMap,
    next_generation: AtomicU64,
    retry_spacing: Duration,
}

impl PhaseTimer {
    pub fn new(target: Weak<dyn PhaseAdvancer>) -> Self {
        Self::with_retry_spacing(target, TRANSITION_RETRY_SPACING)
    }

    pub fn with_retry_spacing(target: Weak<dyn PhaseAdvancer>, retry_spacing: Duration) -> Self {
        Self {
            target,
            timers: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            retry_spacing,
        }
    }

    /// Arm the timer for `ticket` to fire at `ends_at`, cancelling whatever was
    /// pending for `game_id`.
    pub fn schedule(&self, game_id: &str, ticket: PhaseTicket, ends_at: OffsetDateTime) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let remaining = Duration::try_from(ends_at - OffsetDateTime::now_utc()).unwrap_or_default();
        let firing = Firing {
            target: self.target.clone(),
            timers: self.timers.clone(),
            game_id: game_id.to_string(),
            generation,
            ticket,
            ends_at,
            deadline: Instant::now() + remaining,
            retry_spacing: self.retry_spacing,
        };

        // the entry guard is held across abort + insert
        let entry = self.timers.entry(game_id.to_string());
        let pending = PendingTimer {
            generation,
            ticket,
            task: tokio::spawn(firing.run()),
        };
        match entry {
            Entry::Occupied(mut occupied) => {
                let replaced = occupied.insert(pending);
                replaced.task.abort();
                debug!(game_id, %ticket, replaced = %replaced.ticket, "Phase timer replaced");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(pending);
                debug!(game_id, %ticket, remaining_ms = remaining.as_millis(), "Phase timer armed");
            }
        }
    }

    /// Drop the pending timer, if any.
    pub fn cancel(&self, game_id: &str) -> bool {
        match self.timers.remove(game_id) {
            Some((_, pending)) => {
                pending.task.abort();
                debug!(game_id, ticket = %pending.ticket, "Phase timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Ticket the pending timer will try to leave.
    pub fn pending(&self, game_id: &str) -> Option<PhaseTicket> {
        self.timers.get(game_id).map(|pending| pending.ticket)
    }

    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.task.abort();
        }
    }
}

struct Firing {
    target: Weak<dyn PhaseAdvancer>,
    timers: TimerMap,
    game_id: String,
    generation: u64,
    ticket: PhaseTicket,
    ends_at: OffsetDateTime,
    deadline: Instant,
    retry_spacing: Duration,
}

impl Firing {
    async fn run(self) {
        tokio::time::sleep_until(self.deadline).await;

        // claim: a replaced timer has already been aborted, but it may have
        // woken just before that
        let claimed = self
            .timers
            .remove_if(&self.game_id, |_, pending| pending.generation == self.generation)
            .is_some();
        if !claimed {
            debug!(game_id = %self.game_id, ticket = %self.ticket, "Superseded phase timer woke");
            return;
        }

        let attempts = TRANSITION_RETRIES + 1;
        for attempt in 1..=attempts {
            let Some(target) = self.target.upgrade() else {
                debug!(game_id = %self.game_id, "Phase timer target gone");
                return;
            };
            match target
                .advance_phase(&self.game_id, self.ticket, self.ends_at)
                .await
            {
                Ok(()) => return,
                Err(err) => {
                    warn!(
                        game_id = %self.game_id,
                        ticket = %self.ticket,
                        attempt,
                        code = %err.code(),
                        error = %err,
                        "Phase transition failed"
                    );
                }
            }
            drop(target);
            if attempt < attempts {
                tokio::time::sleep(self.retry_spacing).await;
            }
        }

        error!(
            game_id = %self.game_id,
            ticket = %self.ticket,
            code = "SESSION_TIMER_LOST",
            "Session left without a pending phase timer"
        );
    }
}
