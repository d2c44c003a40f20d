//! Channel provider trait definition.
//!
//! This module defines the core `ChannelProvider` trait that all sales
//! channel integrations must implement.

use async_trait::async_trait;

use crate::errors::ChannelError;
use crate::models::{
    BatchItemResult, ChannelCredentials, ChannelItem, ChannelKind, HealthStatus, StockUpdate,
    WebhookStockChange,
};

use super::capabilities::{ProviderCapabilities, RateLimit};

/// Uniform facade over one external vendor API.
///
/// Implement this trait to add support for a new sales channel. The registry
/// uses the provider's capabilities and rate limits to decide how to drive
/// it; the watcher uses `parse_webhook`/`verify_webhook` to turn vendor
/// pushes into normalized stock changes.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Unique identifier for this provider, e.g. "POS" or "STOREFRONT".
    ///
    /// Used for logging, rate limiter and circuit breaker tracking.
    fn id(&self) -> &'static str;

    /// Which kind of sales channel this provider integrates.
    fn kind(&self) -> ChannelKind;

    /// Describes what this provider can do.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Rate limiting configuration.
    fn rate_limit(&self) -> RateLimit;

    /// Validate credentials and cache a session.
    ///
    /// Idempotent; may refresh tokens on repeat calls.
    async fn connect(&self, credentials: &ChannelCredentials) -> Result<(), ChannelError>;

    /// Release vendor-side resources. Idempotent.
    async fn disconnect(&self) -> Result<(), ChannelError>;

    /// List all products known to the vendor, following pagination
    /// internally until exhausted.
    async fn list_products(&self) -> Result<Vec<ChannelItem>, ChannelError>;

    /// Fetch a single product by its vendor identifier.
    ///
    /// Returns `Ok(None)` when the vendor does not know the item.
    async fn get_product(&self, external_id: &str) -> Result<Option<ChannelItem>, ChannelError>;

    /// Write the stock level for one item, atomically at the vendor.
    ///
    /// For availability-only vendors, `quantity = 0` implies unavailable and
    /// `> 0` implies available.
    async fn set_stock(&self, external_id: &str, quantity: i64) -> Result<(), ChannelError>;

    /// Best-effort batch stock write; returns per-item success/failure.
    ///
    /// Default implementation loops over `set_stock`.
    async fn batch_set_stock(
        &self,
        updates: &[StockUpdate],
    ) -> Result<Vec<BatchItemResult>, ChannelError> {
        let mut results = Vec::with_capacity(updates.len());
        for update in updates {
            match self.set_stock(&update.external_id, update.quantity).await {
                Ok(()) => results.push(BatchItemResult {
                    external_id: update.external_id.clone(),
                    success: true,
                    error: None,
                }),
                Err(e) => results.push(BatchItemResult {
                    external_id: update.external_id.clone(),
                    success: false,
                    error: Some(e.to_string()),
                }),
            }
        }
        Ok(results)
    }

    /// Parse a raw webhook body into zero or more normalized stock changes.
    ///
    /// Parsers refuse payloads missing required fields with
    /// [`ChannelError::InvalidPayload`] rather than coercing them.
    fn parse_webhook(&self, raw: &[u8]) -> Result<Vec<WebhookStockChange>, ChannelError>;

    /// Constant-time HMAC check of a webhook signature header.
    fn verify_webhook(&self, raw: &[u8], signature: &str, secret: &str) -> bool {
        crate::signature::verify(
            self.capabilities().webhook_algorithm,
            secret,
            raw,
            signature,
        )
    }

    /// Register a webhook endpoint at the vendor. Returns the vendor's
    /// subscription id.
    async fn subscribe_webhook(
        &self,
        url: &str,
        events: &[String],
    ) -> Result<String, ChannelError>;

    /// Remove a vendor-side webhook registration.
    async fn unsubscribe_webhook(&self, subscription_id: &str) -> Result<(), ChannelError>;

    /// Probe the vendor API.
    async fn health_check(&self) -> HealthStatus;
}
