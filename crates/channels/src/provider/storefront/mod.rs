//! Online storefront channel provider.
//!
//! The storefront vendor exposes a product/inventory REST API:
//! - Products via /api/products (page pagination)
//! - Inventory writes via /api/products/{id}/inventory
//! - Webhook registration via /api/webhooks
//!
//! Webhooks are signed `sha256=<hex(HMAC_SHA256(secret, body))>`. The
//! storefront only ever advertises buffered stock
//! (`max(0, current - buffer)`); the buffer arithmetic lives in the core,
//! this provider just writes what it is told.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::errors::ChannelError;
use crate::models::{
    ChannelCredentials, ChannelItem, ChannelKind, HealthStatus, WebhookStockChange,
};
use crate::provider::{ChannelProvider, ProviderCapabilities, RateLimit};
use crate::signature::SignatureAlgorithm;

const PROVIDER_ID: &str = "STOREFRONT";

// ============================================================================
// API Response Structures
// ============================================================================

/// One product from /api/products
#[derive(Debug, Deserialize)]
struct StoreProduct {
    id: String,
    sku: Option<String>,
    title: String,
    /// Decimal string, e.g. "12.99"
    price: Option<String>,
    currency: Option<String>,
    inventory_quantity: i64,
    #[serde(default = "default_true")]
    available: bool,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_true() -> bool {
    true
}

/// Response from /api/products
#[derive(Debug, Deserialize)]
struct ProductPage {
    products: Vec<StoreProduct>,
    #[serde(default)]
    has_more: bool,
}

/// Response from /api/webhooks
#[derive(Debug, Deserialize)]
struct WebhookRegistration {
    id: String,
}

/// Webhook envelope pushed by the storefront.
#[derive(Debug, Deserialize)]
struct StoreWebhook {
    topic: String,
    event_id: String,
    product_id: String,
    old_quantity: Option<i64>,
    new_quantity: Option<i64>,
    reason: Option<String>,
}

impl From<StoreProduct> for ChannelItem {
    fn from(product: StoreProduct) -> Self {
        ChannelItem {
            external_id: product.id,
            sku: product.sku,
            name: product.title,
            price: product.price.and_then(|p| p.parse::<Decimal>().ok()),
            currency: product.currency,
            quantity: product.inventory_quantity,
            is_tracked: true,
            is_available: product.available,
            updated_at: product.updated_at,
        }
    }
}

// ============================================================================
// StorefrontProvider
// ============================================================================

struct Session {
    base_url: String,
    api_key: String,
}

/// Online storefront channel provider.
///
/// Rate limited to 100 requests per minute with 10 concurrent requests.
pub struct StorefrontProvider {
    client: Client,
    session: RwLock<Option<Session>>,
}

impl StorefrontProvider {
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
            .header("X-Api-Key", &session.api_key))
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

    fn invalid_payload(e: impl std::fmt::Display) -> ChannelError {
        ChannelError::InvalidPayload {
            provider: PROVIDER_ID.to_string(),
            message: e.to_string(),
        }
    }
}

impl Default for StorefrontProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelProvider for StorefrontProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::OnlineStore
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            tracks_quantity: true,
            supports_webhooks: true,
            supports_batch_writes: false,
            webhook_algorithm: SignatureAlgorithm::Sha256,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 100,
            max_concurrency: 10,
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

        let request = self.base_request(reqwest::Method::GET, "/api/status").await?;
        if let Err(e) = self.send(request).await {
            let mut session = self.session.write().await;
            *session = None;
            return Err(e);
        }

        debug!("Storefront provider connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChannelError> {
        let mut session = self.session.write().await;
        *session = None;
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<ChannelItem>, ChannelError> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let path = format!("/api/products?page={}&limit=100", page);
            let request = self.base_request(reqwest::Method::GET, &path).await?;
            let response: ProductPage = self
                .send(request)
                .await?
                .json()
                .await
                .map_err(Self::invalid_payload)?;

            items.extend(response.products.into_iter().map(ChannelItem::from));

            if !response.has_more {
                break;
            }
            page += 1;
        }

        debug!("Storefront list_products returned {} items", items.len());
        Ok(items)
    }

    async fn get_product(&self, external_id: &str) -> Result<Option<ChannelItem>, ChannelError> {
        let path = format!("/api/products/{}", external_id);
        let request = self.base_request(reqwest::Method::GET, &path).await?;

        match self.send(request).await {
            Ok(response) => {
                let product: StoreProduct =
                    response.json().await.map_err(Self::invalid_payload)?;
                Ok(Some(product.into()))
            }
            Err(ChannelError::ItemNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_stock(&self, external_id: &str, quantity: i64) -> Result<(), ChannelError> {
        let path = format!("/api/products/{}/inventory", external_id);
        let request = self
            .base_request(reqwest::Method::PUT, &path)
            .await?
            .json(&serde_json::json!({ "quantity": quantity }));

        self.send(request).await?;
        Ok(())
    }

    fn parse_webhook(&self, raw: &[u8]) -> Result<Vec<WebhookStockChange>, ChannelError> {
        let webhook: StoreWebhook =
            serde_json::from_slice(raw).map_err(Self::invalid_payload)?;

        if !webhook.topic.starts_with("inventory") {
            return Ok(Vec::new());
        }

        Ok(vec![WebhookStockChange {
            product_external_id: webhook.product_id,
            previous_quantity: webhook.old_quantity,
            new_quantity: webhook.new_quantity,
            is_available: None,
            reason: webhook.reason.or(Some(webhook.topic)),
            source_stamp: webhook.event_id,
        }])
    }

    async fn subscribe_webhook(
        &self,
        url: &str,
        events: &[String],
    ) -> Result<String, ChannelError> {
        let request = self
            .base_request(reqwest::Method::POST, "/api/webhooks")
            .await?
            .json(&serde_json::json!({ "url": url, "topics": events }));

        let registration: WebhookRegistration = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(Self::invalid_payload)?;
        Ok(registration.id)
    }

    async fn unsubscribe_webhook(&self, subscription_id: &str) -> Result<(), ChannelError> {
        let path = format!("/api/webhooks/{}", subscription_id);
        let request = self.base_request(reqwest::Method::DELETE, &path).await?;
        self.send(request).await?;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        let started = Instant::now();
        let request = match self.base_request(reqwest::Method::GET, "/api/status").await {
            Ok(r) => r,
            Err(e) => return HealthStatus::unhealthy(0, e.to_string()),
        };

        match self.send(request).await {
            Ok(_) => HealthStatus::healthy(started.elapsed().as_millis() as u64),
            Err(e) => HealthStatus::unhealthy(started.elapsed().as_millis() as u64, e.to_string()),
        }
    }
}
