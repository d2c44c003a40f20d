//! Normalized channel records.
//!
//! Vendor payloads are dynamically shaped; everything that crosses into the
//! core is first narrowed into the records defined here. Parsers refuse
//! payloads missing required fields rather than silently coercing them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The kind of sales channel a provider talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Physical point-of-sale terminal. Source of truth for the merchant;
    /// advertised stock equals the full `current_stock`.
    Pos,
    /// Online storefront. Advertised stock is buffered.
    OnlineStore,
    /// Food-delivery marketplace. Advertised stock is buffered; some items
    /// only track availability, not quantities.
    DeliveryMarketplace,
}

impl ChannelKind {
    /// Whether buffer stock is withheld from this channel kind.
    pub fn is_buffered(self) -> bool {
        !matches!(self, Self::Pos)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pos => "pos",
            Self::OnlineStore => "online_store",
            Self::DeliveryMarketplace => "delivery_marketplace",
        }
    }

    /// Parse a stored kind string. Returns `None` for unknown kinds.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pos" => Some(Self::Pos),
            "online_store" => Some(Self::OnlineStore),
            "delivery_marketplace" => Some(Self::DeliveryMarketplace),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product record as reported by a channel, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelItem {
    /// Identifier of the item in the vendor's system.
    pub external_id: String,
    /// Vendor-side SKU, when the vendor exposes one.
    pub sku: Option<String>,
    pub name: String,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    /// Quantity on hand at the vendor. For availability-only items this is
    /// `1` when available and `0` when not.
    pub quantity: i64,
    /// Whether the vendor tracks a true quantity for this item.
    pub is_tracked: bool,
    /// Whether the item is currently purchasable.
    pub is_available: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A stock change extracted from a vendor webhook, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookStockChange {
    /// The vendor's identifier for the affected item.
    pub product_external_id: String,
    pub previous_quantity: Option<i64>,
    pub new_quantity: Option<i64>,
    /// Availability flip, for vendors that report it without quantities.
    pub is_available: Option<bool>,
    /// Vendor-supplied reason (e.g. "sale", "refund", "adjustment").
    pub reason: Option<String>,
    /// Vendor timestamp or event id used to build the idempotency key.
    pub source_stamp: String,
}

/// Result of a provider health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub connected: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            connected: true,
            latency_ms,
            error: None,
        }
    }

    pub fn unhealthy(latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            connected: false,
            latency_ms,
            error: Some(error.into()),
        }
    }
}

/// Per-item outcome of a batch stock write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub external_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// One entry in a batch stock write request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdate {
    pub external_id: String,
    pub quantity: i64,
}

/// Credentials for connecting to a vendor API.
///
/// Stored encrypted on the channel row; decrypted by the channel service and
/// handed to the provider factory at connect time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCredentials {
    pub api_key: String,
    pub api_secret: Option<String>,
    /// Vendor API base URL. Overridable per channel for sandbox accounts
    /// and for tests.
    pub endpoint: String,
    /// The vendor-side account/location identifier, when required.
    pub instance_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_kind_round_trip() {
        for kind in [
            ChannelKind::Pos,
            ChannelKind::OnlineStore,
            ChannelKind::DeliveryMarketplace,
        ] {
            assert_eq!(ChannelKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ChannelKind::parse("fax_machine"), None);
    }

    #[test]
    fn test_only_pos_is_unbuffered() {
        assert!(!ChannelKind::Pos.is_buffered());
        assert!(ChannelKind::OnlineStore.is_buffered());
        assert!(ChannelKind::DeliveryMarketplace.is_buffered());
    }

    #[test]
    fn test_channel_kind_serde_snake_case() {
        let json = serde_json::to_string(&ChannelKind::DeliveryMarketplace).unwrap();
        assert_eq!(json, "\"delivery_marketplace\"");
    }
}
