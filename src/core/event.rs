//! Events pushed from the core to subscribed clients.
//!
//! Each connected client holds a broadcast receiver; the UI layer renders
//! the user list from presence events, the progress bar from progress
//! events, and the history badges from terminated events. Ordering
//! guarantees: progress events for one session carry non-decreasing byte
//! counts, and the history entry is recorded before the corresponding
//! terminated event is published.

use crate::core::config::EVENT_CHANNEL_CAPACITY;
use crate::core::error::FailureReason;
use crate::core::session::SessionState;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Event stream payload delivered to every subscribed client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreEvent {
    /// A participant's connectivity state changed.
    PresenceChanged {
        participant_id: String,
        display_name: String,
        online: bool,
    },
    /// Throttled byte-level progress for one session.
    TransferProgress {
        session_id: Uuid,
        bytes_transferred: u64,
        total_bytes: u64,
        percent: u8,
    },
    /// A session reached a terminal state. The matching history entry is
    /// already queryable when this event is observed.
    TransferTerminated {
        session_id: Uuid,
        state: SessionState,
        failure: Option<FailureReason>,
    },
}

/// Fan-out bus for [`CoreEvent`]s.
///
/// Cheap to clone; publishing never blocks. A subscriber that falls more
/// than the channel capacity behind observes a lag error on its receiver
/// rather than stalling the core.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe from the current position; past events are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    /// Publish to all current subscribers. An empty audience is fine.
    pub fn publish(&self, event: CoreEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(CoreEvent::PresenceChanged {
            participant_id: "alice".into(),
            display_name: "Alice".into(),
            online: true,
        });

        let ev = a.recv().await.unwrap();
        assert_eq!(ev, b.recv().await.unwrap());
        assert!(matches!(ev, CoreEvent::PresenceChanged { online: true, .. }));
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(CoreEvent::TransferProgress {
            session_id: Uuid::new_v4(),
            bytes_transferred: 1,
            total_bytes: 2,
            percent: 50,
        });
    }

    #[test]
    fn events_serialize_with_the_fields_clients_render() {
        let event = CoreEvent::TransferProgress {
            session_id: Uuid::nil(),
            bytes_transferred: 512,
            total_bytes: 1024,
            percent: 50,
        };
        let json = serde_json::to_value(&event).unwrap();
        let progress = &json["TransferProgress"];
        assert_eq!(progress["bytes_transferred"], 512);
        assert_eq!(progress["total_bytes"], 1024);
        assert_eq!(progress["percent"], 50);
    }
}
