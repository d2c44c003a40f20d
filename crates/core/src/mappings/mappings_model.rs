//! Product-channel mapping domain models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The association between a local product and its external identifier on
/// one channel. Unique on `(channel_id, external_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductChannelMapping {
    pub id: String,
    pub product_id: String,
    pub channel_id: String,
    pub external_id: String,
    pub external_sku: Option<String>,
    /// Operator-created mappings survive re-matching.
    pub is_manual: bool,
    pub created_at: NaiveDateTime,
}

/// Input model for creating a mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMapping {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub product_id: String,
    pub channel_id: String,
    pub external_id: String,
    pub external_sku: Option<String>,
    #[serde(default)]
    pub is_manual: bool,
}
