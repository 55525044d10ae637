use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 256;

/// Attempt lifecycle notifications fanned out to live dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttemptEvent {
    Started {
        event_id: Uuid,
        attempt_id: i64,
        user_id: i64,
        test_id: i64,
        at: DateTime<Utc>,
    },
    Completed {
        event_id: Uuid,
        attempt_id: i64,
        user_id: i64,
        test_id: i64,
        score: i32,
        max_score: i32,
        percentage: i32,
        at: DateTime<Utc>,
    },
}

impl AttemptEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            AttemptEvent::Started { .. } => "attempt-started",
            AttemptEvent::Completed { .. } => "attempt-completed",
        }
    }

    pub fn attempt_id(&self) -> i64 {
        match self {
            AttemptEvent::Started { attempt_id, .. } | AttemptEvent::Completed { attempt_id, .. } => {
                *attempt_id
            }
        }
    }
}

/// Publish/subscribe hub. Each subscriber owns a receiver; dropping it
/// unsubscribes.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AttemptEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers received the event. Publishing with no
    /// listeners is not an error.
    pub fn publish(&self, event: AttemptEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AttemptEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
