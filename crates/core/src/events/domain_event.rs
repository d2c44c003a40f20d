//! Domain event types.

use serde::{Deserialize, Serialize};

/// Events published on a tenant worker's in-process bus.
///
/// These represent facts about sync operations after they commit to the
/// database. Agents subscribe to the topics they care about; the orchestrator
/// receives a relayed copy over IPC for aggregation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockEvent {
    /// A product's stock changed and a write was attempted on a mapping.
    StockChange {
        product_id: String,
        channel_id: String,
        old_quantity: i64,
        new_quantity: i64,
    },

    /// All fan-outs for a stock change resolved successfully.
    SyncCompleted {
        product_id: String,
        source_channel_id: Option<String>,
        channels_updated: usize,
    },

    /// At least one fan-out for a stock change failed terminally.
    SyncFailed {
        product_id: String,
        channel_id: Option<String>,
        error: String,
    },

    /// Reconciliation found a channel disagreeing with expected stock.
    DriftDetected {
        product_id: String,
        channel_id: String,
        actual: i64,
        expected: i64,
        drift: i64,
        drift_pct: f64,
        /// Whether the pass that found this drift was allowed to repair it.
        auto_repair: bool,
    },

    /// Reconciliation pushed the expected value back to a drifted channel.
    DriftRepaired {
        product_id: String,
        channel_id: String,
        quantity: i64,
    },

    /// An alert rule fired and was dispatched.
    AlertTriggered {
        alert_id: String,
        kind: String,
        severity: String,
    },

    /// A channel passed credential validation and went active.
    ChannelConnected { channel_id: String },

    /// A channel was deactivated after persistent failure.
    ChannelDisconnected { channel_id: String, reason: String },
}

impl StockEvent {
    /// The bus topic this event belongs to, e.g. `drift.detected`.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::StockChange { .. } => "stock.change",
            Self::SyncCompleted { .. } => "sync.completed",
            Self::SyncFailed { .. } => "sync.failed",
            Self::DriftDetected { .. } => "drift.detected",
            Self::DriftRepaired { .. } => "drift.repaired",
            Self::AlertTriggered { .. } => "alert.triggered",
            Self::ChannelConnected { .. } => "channel.connected",
            Self::ChannelDisconnected { .. } => "channel.disconnected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = StockEvent::DriftDetected {
            product_id: "p1".to_string(),
            channel_id: "c1".to_string(),
            actual: 42,
            expected: 50,
            drift: -8,
            drift_pct: 16.0,
            auto_repair: true,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("drift_detected"));

        let back: StockEvent = serde_json::from_str(&json).unwrap();
        match back {
            StockEvent::DriftDetected { drift, .. } => assert_eq!(drift, -8),
            _ => panic!("Expected DriftDetected"),
        }
    }

    #[test]
    fn test_topics() {
        let event = StockEvent::ChannelDisconnected {
            channel_id: "c1".to_string(),
            reason: "health checks failing".to_string(),
        };
        assert_eq!(event.topic(), "channel.disconnected");
    }
}
