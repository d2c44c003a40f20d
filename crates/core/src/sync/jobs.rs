//! Sync job payloads.
//!
//! Jobs travel through the queues as `(name, JSON data)` pairs; this module
//! defines the payload structs and the name constants in one place.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::queue::JobRecord;

/// Job name constants.
pub mod names {
    /// Normalized stock change from a webhook or poll (channel-relative).
    pub const STOCK_CHANGED: &str = "stock_changed";
    /// Push the expected quantity of one product to one channel.
    pub const PUSH_UPDATE: &str = "push_update";
    /// Walk all mappings for a channel and push each.
    pub const FULL_SYNC: &str = "full_sync";
    /// Poll a channel's diff since a given instant and reconcile.
    pub const INCREMENTAL_SYNC: &str = "incremental_sync";
    /// Dispatch one written alert through its rule actions.
    pub const DISPATCH_ALERT: &str = "dispatch_alert";
}

/// A normalized stock-change intent, as produced by the watcher.
///
/// Quantities are channel-relative: `new_quantity` is what the source
/// channel now advertises, not the merchant's total. The sync agent
/// reconstructs the authoritative stock from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChangedJob {
    pub channel_id: String,
    pub external_id: String,
    pub previous_quantity: Option<i64>,
    pub new_quantity: Option<i64>,
    pub is_available: Option<bool>,
    pub reason: Option<String>,
    /// `(channel_id, external_id, source_stamp)` - the dedup key.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushUpdateJob {
    pub product_id: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncJob {
    pub channel_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalSyncJob {
    pub channel_id: String,
    /// RFC 3339 instant of the last successful poll.
    pub since: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchAlertJob {
    pub alert_id: String,
    pub kind: String,
    pub severity: String,
    pub message: String,
    /// Actions from the rule that fired, carried inline so dispatch does not
    /// re-read rule state that may have changed since.
    pub actions: Vec<crate::alerts::RuleAction>,
}

/// Decode a job record's payload.
pub fn decode<T: serde::de::DeserializeOwned>(job: &JobRecord) -> Result<T> {
    Ok(serde_json::from_value(job.data.clone())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobStatus, QueueName};

    #[test]
    fn test_decode_stock_changed() {
        let payload = StockChangedJob {
            channel_id: "c1".to_string(),
            external_id: "itm_9".to_string(),
            previous_quantity: Some(100),
            new_quantity: Some(95),
            is_available: None,
            reason: Some("sale".to_string()),
            idempotency_key: "c1:itm_9:evt_1".to_string(),
        };

        let job = JobRecord {
            id: "j1".to_string(),
            tenant_id: "t1".to_string(),
            queue: QueueName::Webhook,
            name: names::STOCK_CHANGED.to_string(),
            data: serde_json::to_value(&payload).unwrap(),
            status: JobStatus::Active,
            priority: 1,
            attempts_made: 1,
            max_attempts: 5,
            backoff_delay_ms: 1000,
            run_at: chrono::Utc::now().naive_utc(),
            last_error: None,
            created_at: chrono::Utc::now().naive_utc(),
        };

        let decoded: StockChangedJob = decode(&job).unwrap();
        assert_eq!(decoded.new_quantity, Some(95));
        assert_eq!(decoded.idempotency_key, "c1:itm_9:evt_1");
    }

    #[test]
    fn test_decode_wrong_shape_errors() {
        let job = JobRecord {
            id: "j1".to_string(),
            tenant_id: "t1".to_string(),
            queue: QueueName::Sync,
            name: names::PUSH_UPDATE.to_string(),
            data: serde_json::json!({ "nope": true }),
            status: JobStatus::Active,
            priority: 10,
            attempts_made: 1,
            max_attempts: 3,
            backoff_delay_ms: 1000,
            run_at: chrono::Utc::now().naive_utc(),
            last_error: None,
            created_at: chrono::Utc::now().naive_utc(),
        };

        assert!(decode::<PushUpdateJob>(&job).is_err());
    }
}
