//! Event sink trait and implementations.

use std::sync::{Arc, Mutex};

use super::{EventBus, StockEvent};

/// Trait for receiving domain events.
///
/// Services emit events through this trait after successful mutations.
///
/// # Design Rules
///
/// - `emit()` must be fast and non-blocking (no network calls, no DB writes)
/// - Failure to emit must not affect domain operations (best-effort)
pub trait EventSink: Send + Sync {
    /// Emit a single event.
    fn emit(&self, event: StockEvent);

    /// Emit multiple events.
    fn emit_batch(&self, events: Vec<StockEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

/// The bus itself is the production sink.
impl EventSink for EventBus {
    fn emit(&self, event: StockEvent) {
        self.publish(event);
    }
}

/// No-op implementation for contexts that don't need events.
#[derive(Clone, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: StockEvent) {
        // Intentionally empty - events are discarded
    }
}

/// Mock sink for testing - collects emitted events.
#[derive(Clone, Default)]
pub struct MockEventSink {
    events: Arc<Mutex<Vec<StockEvent>>>,
}

impl MockEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    pub fn events(&self) -> Vec<StockEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events matching a topic, in emission order.
    pub fn events_for(&self, topic: &str) -> Vec<StockEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.topic() == topic)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }
}

impl EventSink for MockEventSink {
    fn emit(&self, event: StockEvent) {
        self.events.lock().unwrap().push(event);
    }
}
