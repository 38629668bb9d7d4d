//! Event publisher capability. Events are fire-and-forget; a publisher with
//! no listeners is not an error.

use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;

use river_types::events::RiverEvent;

pub trait EventSink: Send + Sync {
    fn publish(&self, event: RiverEvent);
}

/// Drops every event.
pub struct NoopEvents;

impl EventSink for NoopEvents {
    fn publish(&self, _event: RiverEvent) {}
}

/// Fans events out to in-process subscribers.
pub struct BroadcastEvents {
    tx: broadcast::Sender<RiverEvent>,
}

impl BroadcastEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RiverEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastEvents {
    fn publish(&self, event: RiverEvent) {
        debug!(river_id = event.river_id(), ?event, "river event");
        let _ = self.tx.send(event);
    }
}

/// Records published events for assertions.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<RiverEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<RiverEvent> {
        std::mem::take(&mut self.events.lock().unwrap())
    }
}

impl EventSink for RecordingEvents {
    fn publish(&self, event: RiverEvent) {
        self.events.lock().unwrap().push(event);
    }
}
