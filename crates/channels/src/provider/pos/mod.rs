//! Point-of-sale channel provider.
//!
//! The POS vendor exposes a catalog/inventory REST API:
//! - Items via /v1/catalog/items (cursor pagination)
//! - Inventory writes via /v1/inventory/{id}
//! - Webhook registration via /v1/webhooks
//!
//! Webhooks are signed `sha256=<hex(HMAC_SHA256(secret, body))>`. The POS is
//! the merchant's source of truth: advertised stock equals the full current
//! stock, never the buffered quantity.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::errors::ChannelError;
use crate::models::{
    BatchItemResult, ChannelCredentials, ChannelItem, ChannelKind, HealthStatus, StockUpdate,
    WebhookStockChange,
};
use crate::provider::{ChannelProvider, ProviderCapabilities, RateLimit};
use crate::signature::SignatureAlgorithm;

const PROVIDER_ID: &str = "POS";

// ============================================================================
// API Response Structures
// ============================================================================

/// One item from /v1/catalog/items
#[derive(Debug, Deserialize)]
struct CatalogItem {
    id: String,
    sku: Option<String>,
    name: String,
    /// Price in minor units (cents)
    price_cents: Option<i64>,
    currency: Option<String>,
    quantity: i64,
    #[serde(default = "default_true")]
    track_inventory: bool,
    #[serde(default = "default_true")]
    sellable: bool,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_true() -> bool {
    true
}

/// Response from /v1/catalog/items
#[derive(Debug, Deserialize)]
struct CatalogPage {
    items: Vec<CatalogItem>,
    cursor: Option<String>,
}

/// Response from /v1/webhooks
#[derive(Debug, Deserialize)]
struct WebhookRegistration {
    id: String,
}

/// Webhook envelope pushed by the POS.
#[derive(Debug, Deserialize)]
struct PosWebhook {
    event_type: String,
    event_id: String,
    data: PosWebhookData,
}

#[derive(Debug, Deserialize)]
struct PosWebhookData {
    item_id: String,
    previous_quantity: Option<i64>,
    quantity: Option<i64>,
    reason: Option<String>,
}

impl From<CatalogItem> for ChannelItem {
    fn from(item: CatalogItem) -> Self {
        ChannelItem {
            external_id: item.id,
            sku: item.sku,
            name: item.name,
            price: item.price_cents.map(|cents| Decimal::new(cents, 2)),
            currency: item.currency,
            quantity: item.quantity,
            is_tracked: item.track_inventory,
            is_available: item.sellable,
            updated_at: item.updated_at,
        }
    }
}

// ============================================================================
// PosProvider
// ============================================================================

struct Session {
    base_url: String,
    api_key: String,
}

/// Point-of-sale channel provider.
///
/// Rate limited to 60 requests per minute with 5 concurrent requests.
pub struct PosProvider {
    client: Client,
    session: RwLock<Option<Session>>,
}

impl PosProvider {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            session: RwLock::new(None),
        }
    }

    async fn base_request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, ChannelError> {
        let session = self.session.read().await;
        let session = session.as_ref().ok_or_else(|| ChannelError::NotConnected {
            provider: PROVIDER_ID.to_string(),
        })?;

        let url = format!("{}{}", session.base_url, path);
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(&session.api_key))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ChannelError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ChannelError::Timeout {
                    provider: PROVIDER_ID.to_string(),
                }
            } else {
                ChannelError::Network(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = super::retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::from_status(PROVIDER_ID, status, body, retry_after))
    }
}

impl Default for PosProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelProvider for PosProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Pos
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            tracks_quantity: true,
            supports_webhooks: true,
            supports_batch_writes: true,
            webhook_algorithm: SignatureAlgorithm::Sha256,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
            max_concurrency: 5,
            operation_timeout: Duration::from_secs(30),
        }
    }

    async fn connect(&self, credentials: &ChannelCredentials) -> Result<(), ChannelError> {
        {
            let mut session = self.session.write().await;
            *session = Some(Session {
                base_url: credentials.endpoint.trim_end_matches('/').to_string(),
                api_key: credentials.api_key.clone(),
            });
        }

        // Validate by pinging; roll the session back on failure so a later
        // connect() starts clean.
        let request = self.base_request(reqwest::Method::GET, "/v1/ping").await?;
        if let Err(e) = self.send(request).await {
            let mut session = self.session.write().await;
            *session = None;
            return Err(e);
        }

        debug!("POS provider connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChannelError> {
        let mut session = self.session.write().await;
        *session = None;
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<ChannelItem>, ChannelError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut path = "/v1/catalog/items?limit=100".to_string();
            if let Some(ref c) = cursor {
                path.push_str("&cursor=");
                path.push_str(c);
            }

            let request = self.base_request(reqwest::Method::GET, &path).await?;
            let page: CatalogPage = self.send(request).await?.json().await.map_err(|e| {
                ChannelError::InvalidPayload {
                    provider: PROVIDER_ID.to_string(),
                    message: e.to_string(),
                }
            })?;

            items.extend(page.items.into_iter().map(ChannelItem::from));

            match page.cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        debug!("POS list_products returned {} items", items.len());
        Ok(items)
    }

    async fn get_product(&self, external_id: &str) -> Result<Option<ChannelItem>, ChannelError> {
        let path = format!("/v1/catalog/items/{}", external_id);
        let request = self.base_request(reqwest::Method::GET, &path).await?;

        match self.send(request).await {
            Ok(response) => {
                let item: CatalogItem = response.json().await.map_err(|e| {
                    ChannelError::InvalidPayload {
                        provider: PROVIDER_ID.to_string(),
                        message: e.to_string(),
                    }
                })?;
                Ok(Some(item.into()))
            }
            Err(ChannelError::ItemNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_stock(&self, external_id: &str, quantity: i64) -> Result<(), ChannelError> {
        let path = format!("/v1/inventory/{}", external_id);
        let request = self
            .base_request(reqwest::Method::PUT, &path)
            .await?
            .json(&serde_json::json!({ "quantity": quantity }));

        self.send(request).await?;
        Ok(())
    }

    async fn batch_set_stock(
        &self,
        updates: &[StockUpdate],
    ) -> Result<Vec<BatchItemResult>, ChannelError> {
        #[derive(Debug, Deserialize)]
        struct BatchResponse {
            results: Vec<BatchEntry>,
        }
        #[derive(Debug, Deserialize)]
        struct BatchEntry {
            item_id: String,
            success: bool,
            error: Option<String>,
        }

        let request = self
            .base_request(reqwest::Method::POST, "/v1/inventory/batch")
            .await?
            .json(&serde_json::json!({
                "updates": updates
                    .iter()
                    .map(|u| serde_json::json!({ "item_id": u.external_id, "quantity": u.quantity }))
                    .collect::<Vec<_>>()
            }));

        let response: BatchResponse = self.send(request).await?.json().await.map_err(|e| {
            ChannelError::InvalidPayload {
                provider: PROVIDER_ID.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(response
            .results
            .into_iter()
            .map(|entry| BatchItemResult {
                external_id: entry.item_id,
                success: entry.success,
                error: entry.error,
            })
            .collect())
    }

    fn parse_webhook(&self, raw: &[u8]) -> Result<Vec<WebhookStockChange>, ChannelError> {
        let webhook: PosWebhook =
            serde_json::from_slice(raw).map_err(|e| ChannelError::InvalidPayload {
                provider: PROVIDER_ID.to_string(),
                message: e.to_string(),
            })?;

        // Only inventory events carry stock changes; acknowledge the rest
        // with an empty set so the vendor does not retry.
        if webhook.event_type != "inventory.updated" && webhook.event_type != "item.sold" {
            return Ok(Vec::new());
        }

        Ok(vec![WebhookStockChange {
            product_external_id: webhook.data.item_id,
            previous_quantity: webhook.data.previous_quantity,
            new_quantity: webhook.data.quantity,
            is_available: None,
            reason: webhook.data.reason.or(Some(webhook.event_type)),
            source_stamp: webhook.event_id,
        }])
    }

    async fn subscribe_webhook(
        &self,
        url: &str,
        events: &[String],
    ) -> Result<String, ChannelError> {
        let request = self
            .base_request(reqwest::Method::POST, "/v1/webhooks")
            .await?
            .json(&serde_json::json!({ "url": url, "events": events }));

        let registration: WebhookRegistration =
            self.send(request).await?.json().await.map_err(|e| {
                ChannelError::InvalidPayload {
                    provider: PROVIDER_ID.to_string(),
                    message: e.to_string(),
                }
            })?;
        Ok(registration.id)
    }

    async fn unsubscribe_webhook(&self, subscription_id: &str) -> Result<(), ChannelError> {
        let path = format!("/v1/webhooks/{}", subscription_id);
        let request = self.base_request(reqwest::Method::DELETE, &path).await?;
        self.send(request).await?;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        let started = Instant::now();
        let request = match self.base_request(reqwest::Method::GET, "/v1/ping").await {
            Ok(r) => r,
            Err(e) => return HealthStatus::unhealthy(0, e.to_string()),
        };

        match self.send(request).await {
            Ok(_) => HealthStatus::healthy(started.elapsed().as_millis() as u64),
            Err(e) => HealthStatus::unhealthy(started.elapsed().as_millis() as u64, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature;

    #[test]
    fn test_parse_inventory_webhook() {
        let provider = PosProvider::new();
        let raw = br#"{
            "event_type": "inventory.updated",
            "event_id": "evt_123",
            "data": { "item_id": "itm_9", "previous_quantity": 100, "quantity": 95, "reason": "sale" }
        }"#;

        let changes = provider.parse_webhook(raw).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].product_external_id, "itm_9");
        assert_eq!(changes[0].new_quantity, Some(95));
        assert_eq!(changes[0].source_stamp, "evt_123");
    }

    #[test]
    fn test_parse_unrelated_event_is_empty() {
        let provider = PosProvider::new();
        let raw = br#"{
            "event_type": "item.created",
            "event_id": "evt_124",
            "data": { "item_id": "itm_9" }
        }"#;

        let changes = provider.parse_webhook(raw).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_parse_malformed_webhook_is_refused() {
        let provider = PosProvider::new();
        let result = provider.parse_webhook(b"{\"event_type\":\"inventory.updated\"}");
        assert!(matches!(result, Err(ChannelError::InvalidPayload { .. })));
    }

    #[test]
    fn test_verify_webhook_uses_sha256() {
        let provider = PosProvider::new();
        let body = b"{\"ok\":true}";
        let header = signature::sign(SignatureAlgorithm::Sha256, "secret", body);
        assert!(provider.verify_webhook(body, &header, "secret"));
        assert!(!provider.verify_webhook(body, &header, "other"));
    }
}
