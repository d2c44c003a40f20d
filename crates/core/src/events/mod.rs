//! Domain events, the per-worker bus, and event sinks.

mod bus;
mod domain_event;
mod sink;

pub use bus::EventBus;
pub use domain_event::StockEvent;
pub use sink::{EventSink, MockEventSink, NoOpEventSink};
