//! Broadcaster that keeps every delivery for assertions.

use async_trait::async_trait;
use mafia_backend::broadcast::{Broadcaster, GameEvent};
use mafia_backend::AppError;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Room { room_id: String, event: GameEvent },
    User { user_id: String, event: GameEvent },
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    /// Room events in delivery order.
    pub fn room_events(&self) -> Vec<GameEvent> {
        self.deliveries
            .lock()
            .iter()
            .filter_map(|d| match d {
                Delivery::Room { event, .. } => Some(event.clone()),
                Delivery::User { .. } => None,
            })
            .collect()
    }

    /// Private events sent to `user_id`.
    pub fn user_events(&self, user_id: &str) -> Vec<GameEvent> {
        self.deliveries
            .lock()
            .iter()
            .filter_map(|d| match d {
                Delivery::User { user_id: to, event } if to == user_id => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    /// Room events of one kind, e.g. `"vote_result"`.
    pub fn room_events_of(&self, kind: &str) -> Vec<GameEvent> {
        self.room_events()
            .into_iter()
            .filter(|event| event.kind() == kind)
            .collect()
    }

    pub fn clear(&self) {
        self.deliveries.lock().clear();
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn send_to_room(&self, room_id: &str, event: &GameEvent) -> Result<(), AppError> {
        self.deliveries.lock().push(Delivery::Room {
            room_id: room_id.to_string(),
            event: event.clone(),
        });
        Ok(())
    }

    async fn send_to_user(&self, user_id: &str, event: &GameEvent) -> Result<(), AppError> {
        self.deliveries.lock().push(Delivery::User {
            user_id: user_id.to_string(),
            event: event.clone(),
        });
        Ok(())
    }
}
