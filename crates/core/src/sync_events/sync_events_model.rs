//! Sync event audit log models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Status of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SyncEventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Pending and processing events are in flight.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

/// One row in the append-only sync audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEventRecord {
    pub id: String,
    pub tenant_id: String,
    /// e.g. `stock_changed`, `push_update`, `sync_error`, `drift_repair`.
    pub event_type: String,
    pub channel_id: Option<String>,
    pub product_id: Option<String>,
    pub old_value: Option<i64>,
    pub new_value: Option<i64>,
    pub status: SyncEventStatus,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Input model for appending to the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSyncEvent {
    pub tenant_id: String,
    pub event_type: String,
    pub channel_id: Option<String>,
    pub product_id: Option<String>,
    pub old_value: Option<i64>,
    pub new_value: Option<i64>,
    pub status: SyncEventStatus,
    pub error_message: Option<String>,
}

impl NewSyncEvent {
    pub fn completed(
        tenant_id: &str,
        event_type: &str,
        channel_id: Option<&str>,
        product_id: Option<&str>,
        old_value: Option<i64>,
        new_value: Option<i64>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            event_type: event_type.to_string(),
            channel_id: channel_id.map(str::to_string),
            product_id: product_id.map(str::to_string),
            old_value,
            new_value,
            status: SyncEventStatus::Completed,
            error_message: None,
        }
    }

    pub fn failed(
        tenant_id: &str,
        event_type: &str,
        channel_id: Option<&str>,
        product_id: Option<&str>,
        error: &str,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            event_type: event_type.to_string(),
            channel_id: channel_id.map(str::to_string),
            product_id: product_id.map(str::to_string),
            old_value: None,
            new_value: None,
            status: SyncEventStatus::Failed,
            error_message: Some(error.to_string()),
        }
    }
}
