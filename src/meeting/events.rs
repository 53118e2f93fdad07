use serde::Serialize;
use tokio::sync::broadcast;

use super::state::{ActionItem, AgendaPoint};

const EVENT_CAPACITY: usize = 64;

/// Change notifications published by `MeetingState`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MeetingEvent {
    AgendaPointAdded(AgendaPoint),
    AgendaPointUpdated(AgendaPoint),
    AgendaPointRemoved { id: String },
    ActionItemAdded(ActionItem),
    ActionItemUpdated(ActionItem),
}

/// Typed broadcast bus; lagging or absent subscribers never block publishers
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MeetingEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MeetingEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: MeetingEvent) {
        tracing::debug!("Meeting event: {:?}", event);
        // Err only means nobody is listening
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
