//! Alert domain models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// What an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowStock,
    SyncError,
    ChannelDisconnected,
    System,
    DriftDetected,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LowStock => "low_stock",
            Self::SyncError => "sync_error",
            Self::ChannelDisconnected => "channel_disconnected",
            Self::System => "system",
            Self::DriftDetected => "drift_detected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low_stock" => Some(Self::LowStock),
            "sync_error" => Some(Self::SyncError),
            "channel_disconnected" => Some(Self::ChannelDisconnected),
            "system" => Some(Self::System),
            "drift_detected" => Some(Self::DriftDetected),
            _ => None,
        }
    }
}

/// How urgent an alert is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A persisted alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub tenant_id: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    /// Additional context as JSON string (product/channel ids, drift
    /// numbers, autoRepair flag).
    pub metadata: Option<String>,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

/// Input model for writing an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub tenant_id: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub metadata: Option<String>,
}

/// A tenant's alerting rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub tenant_id: String,
    pub kind: AlertKind,
    pub conditions: RuleConditions,
    pub actions: Vec<RuleAction>,
    pub is_active: bool,
}

/// Rule conditions. Fields are optional; absent means "no constraint" and
/// kind-specific defaults apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConditions {
    /// `low_stock`: trigger at `current_stock <= threshold`
    /// (default: the product's buffer stock).
    pub threshold: Option<i64>,
    /// `drift_detected`: trigger at `drift_pct >= percentage_threshold`
    /// (default 15).
    pub percentage_threshold: Option<f64>,
    /// Restrict to specific products.
    pub product_ids: Option<Vec<String>>,
    /// Restrict to specific channels.
    pub channel_ids: Option<Vec<String>>,
}

/// What to do when a rule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Broadcast to the tenant's connected real-time surfaces.
    Notify,
    /// Send an email to each recipient.
    Email { recipients: Vec<String> },
    /// POST the alert to an external URL.
    Webhook { url: String },
}
