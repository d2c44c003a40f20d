//! In-process typed publish/subscribe for a single tenant worker.
//!
//! Built on `tokio::sync::broadcast`. Publishing never blocks; slow
//! subscribers that fall behind the channel capacity lose the oldest events
//! (they learn about it via `RecvError::Lagged`), which is acceptable because
//! every event is also persisted before it is published.

use log::trace;
use tokio::sync::broadcast;

use super::StockEvent;

const BUS_CAPACITY: usize = 256;

/// The per-worker event bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StockEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that received it. Zero subscribers
    /// is not an error; events are facts, not commands.
    pub fn publish(&self, event: StockEvent) -> usize {
        trace!("bus publish: {}", event.topic());
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to all events. Filter by [`StockEvent::topic`] as needed.
    pub fn subscribe(&self) -> broadcast::Receiver<StockEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
