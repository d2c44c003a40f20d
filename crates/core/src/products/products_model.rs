//! Product domain models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use stockclerk_channels::ChannelKind;

use crate::errors::{Error, Result, ValidationError};

/// A product in a tenant's catalog.
///
/// `current_stock` is the merchant's authoritative total inventory.
/// `buffer_stock` is reserved for the physical location and withheld from
/// online channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub tenant_id: String,
    /// Unique per tenant.
    pub sku: String,
    pub name: String,
    pub barcode: Option<String>,
    pub current_stock: i64,
    pub buffer_stock: i64,
    /// Additional metadata as JSON string
    pub metadata: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Product {
    /// Stock advertised to online channels: `max(0, current - buffer)`.
    pub fn expected_online(&self) -> i64 {
        (self.current_stock - self.buffer_stock).max(0)
    }

    /// Stock a channel of the given kind should advertise.
    pub fn expected_for(&self, kind: ChannelKind) -> i64 {
        if kind.is_buffered() {
            self.expected_online()
        } else {
            self.current_stock
        }
    }
}

/// Input model for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub tenant_id: String,
    pub sku: String,
    pub name: String,
    pub barcode: Option<String>,
    pub current_stock: i64,
    #[serde(default)]
    pub buffer_stock: i64,
    pub metadata: Option<String>,
}

impl NewProduct {
    pub fn validate(&self) -> Result<()> {
        if self.sku.trim().is_empty() {
            return Err(Error::Validation(ValidationError::MissingField(
                "sku".to_string(),
            )));
        }
        if self.name.trim().is_empty() {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "Product name cannot be empty".to_string(),
            )));
        }
        if self.current_stock < 0 || self.buffer_stock < 0 {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "Stock levels cannot be negative".to_string(),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn product(current: i64, buffer: i64) -> Product {
        let now = chrono::Utc::now().naive_utc();
        Product {
            id: "p1".to_string(),
            tenant_id: "t1".to_string(),
            sku: "SKU-1".to_string(),
            name: "Beans".to_string(),
            barcode: None,
            current_stock: current,
            buffer_stock: buffer,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_expected_online_subtracts_buffer() {
        assert_eq!(product(100, 10).expected_online(), 90);
    }

    #[test]
    fn test_expected_online_never_negative() {
        assert_eq!(product(5, 10).expected_online(), 0);
    }

    #[test]
    fn test_pos_sees_full_stock() {
        let p = product(100, 10);
        assert_eq!(p.expected_for(ChannelKind::Pos), 100);
        assert_eq!(p.expected_for(ChannelKind::OnlineStore), 90);
        assert_eq!(p.expected_for(ChannelKind::DeliveryMarketplace), 90);
    }

    proptest! {
        #[test]
        fn prop_expected_online_is_never_negative(current in 0i64..1_000_000, buffer in 0i64..1_000_000) {
            prop_assert!(product(current, buffer).expected_online() >= 0);
        }

        #[test]
        fn prop_buffered_never_exceeds_current(current in 0i64..1_000_000, buffer in 0i64..1_000_000) {
            let p = product(current, buffer);
            prop_assert!(p.expected_online() <= p.current_stock);
        }
    }
}
