//! Event bus shared by the engine, the safety service and the SSE endpoint
//!
//! Thin wrapper over a `tokio::sync::broadcast` channel. Sending never fails
//! from the caller's point of view: having no subscribers is normal.

use dozy_common::DozyEvent;
use tokio::sync::broadcast;

/// Default number of events a slow subscriber may lag behind
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DozyEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Broadcast an event to all current subscribers
    pub fn emit(&self, event: DozyEvent) {
        // No receivers is OK
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DozyEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
