//! Delivery marketplace channel provider.
//!
//! The marketplace vendor is availability-first: every menu item has an
//! `available` flag, and items with `track_inventory = true` additionally
//! carry a `stock_count`. Stock writes toggle availability for untracked
//! items and write the count for tracked ones.
//!
//! Webhooks are signed `sha1=<hex(HMAC_SHA1(secret, body))>` (the vendor has
//! never upgraded).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::errors::ChannelError;
use crate::models::{
    ChannelCredentials, ChannelItem, ChannelKind, HealthStatus, WebhookStockChange,
};
use crate::provider::{ChannelProvider, ProviderCapabilities, RateLimit};
use crate::signature::SignatureAlgorithm;

const PROVIDER_ID: &str = "MARKETPLACE";

// ============================================================================
// API Response Structures
// ============================================================================

/// One menu item from /v2/menu/items
#[derive(Debug, Deserialize)]
struct MenuItem {
    item_id: String,
    sku: Option<String>,
    name: String,
    available: bool,
    #[serde(default)]
    track_inventory: bool,
    stock_count: Option<i64>,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Response from /v2/menu/items
#[derive(Debug, Deserialize)]
struct MenuPage {
    items: Vec<MenuItem>,
    next_page_token: Option<String>,
}

/// Response from /v2/webhooks
#[derive(Debug, Deserialize)]
struct WebhookRegistration {
    subscription_id: String,
}

/// Webhook envelope pushed by the marketplace.
#[derive(Debug, Deserialize)]
struct MarketplaceWebhook {
    #[serde(rename = "type")]
    event_type: String,
    event_id: String,
    item_id: String,
    available: Option<bool>,
    stock_count: Option<i64>,
}

impl From<MenuItem> for ChannelItem {
    fn from(item: MenuItem) -> Self {
        // Availability-only items surface as quantity 0/1 so the differ
        // still sees flips.
        let quantity = if item.track_inventory {
            item.stock_count.unwrap_or(0)
        } else if item.available {
            1
        } else {
            0
        };

        ChannelItem {
            external_id: item.item_id,
            sku: item.sku,
            name: item.name,
            price: None,
            currency: None,
            quantity,
            is_tracked: item.track_inventory,
            is_available: item.available,
            updated_at: item.updated_at,
        }
    }
}

// ============================================================================
// MarketplaceProvider
// ============================================================================

struct Session {
    base_url: String,
    api_key: String,
    store_id: Option<String>,
}

/// Delivery marketplace channel provider.
///
/// Rate limited to 50 requests per minute with 5 concurrent requests.
pub struct MarketplaceProvider {
    client: Client,
    session: RwLock<Option<Session>>,
}

impl MarketplaceProvider {
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
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&session.api_key);
        if let Some(ref store_id) = session.store_id {
            request = request.header("X-Store-Id", store_id);
        }
        Ok(request)
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

impl Default for MarketplaceProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelProvider for MarketplaceProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::DeliveryMarketplace
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            // Per-item: tracked items carry a count, the rest only toggle.
            tracks_quantity: true,
            supports_webhooks: true,
            supports_batch_writes: false,
            webhook_algorithm: SignatureAlgorithm::Sha1,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 50,
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
                store_id: credentials.instance_id.clone(),
            });
        }

        let request = self.base_request(reqwest::Method::GET, "/v2/health").await?;
        if let Err(e) = self.send(request).await {
            let mut session = self.session.write().await;
            *session = None;
            return Err(e);
        }

        debug!("Marketplace provider connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChannelError> {
        let mut session = self.session.write().await;
        *session = None;
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<ChannelItem>, ChannelError> {
        let mut items = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut path = "/v2/menu/items?page_size=100".to_string();
            if let Some(ref t) = token {
                path.push_str("&page_token=");
                path.push_str(t);
            }

            let request = self.base_request(reqwest::Method::GET, &path).await?;
            let page: MenuPage = self
                .send(request)
                .await?
                .json()
                .await
                .map_err(Self::invalid_payload)?;

            items.extend(page.items.into_iter().map(ChannelItem::from));

            match page.next_page_token {
                Some(t) if !t.is_empty() => token = Some(t),
                _ => break,
            }
        }

        debug!("Marketplace list_products returned {} items", items.len());
        Ok(items)
    }

    async fn get_product(&self, external_id: &str) -> Result<Option<ChannelItem>, ChannelError> {
        let path = format!("/v2/menu/items/{}", external_id);
        let request = self.base_request(reqwest::Method::GET, &path).await?;

        match self.send(request).await {
            Ok(response) => {
                let item: MenuItem = response.json().await.map_err(Self::invalid_payload)?;
                Ok(Some(item.into()))
            }
            Err(ChannelError::ItemNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_stock(&self, external_id: &str, quantity: i64) -> Result<(), ChannelError> {
        // Tracked items get a count; untracked ones only flip availability.
        // The vendor ignores `stock_count` for untracked items, so sending
        // both is safe and saves a read before every write.
        let path = format!("/v2/menu/items/{}/stock", external_id);
        let request = self
            .base_request(reqwest::Method::PUT, &path)
            .await?
            .json(&serde_json::json!({
                "available": quantity > 0,
                "stock_count": quantity.max(0),
            }));

        self.send(request).await?;
        Ok(())
    }

    fn parse_webhook(&self, raw: &[u8]) -> Result<Vec<WebhookStockChange>, ChannelError> {
        let webhook: MarketplaceWebhook =
            serde_json::from_slice(raw).map_err(Self::invalid_payload)?;

        if webhook.event_type != "item.stock_changed" {
            return Ok(Vec::new());
        }

        if webhook.available.is_none() && webhook.stock_count.is_none() {
            return Err(ChannelError::InvalidPayload {
                provider: PROVIDER_ID.to_string(),
                message: "stock_changed event carries neither availability nor count".to_string(),
            });
        }

        Ok(vec![WebhookStockChange {
            product_external_id: webhook.item_id,
            previous_quantity: None,
            new_quantity: webhook.stock_count,
            is_available: webhook.available,
            reason: Some(webhook.event_type),
            source_stamp: webhook.event_id,
        }])
    }

    async fn subscribe_webhook(
        &self,
        url: &str,
        events: &[String],
    ) -> Result<String, ChannelError> {
        let request = self
            .base_request(reqwest::Method::POST, "/v2/webhooks")
            .await?
            .json(&serde_json::json!({ "callback_url": url, "event_types": events }));

        let registration: WebhookRegistration = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(Self::invalid_payload)?;
        Ok(registration.subscription_id)
    }

    async fn unsubscribe_webhook(&self, subscription_id: &str) -> Result<(), ChannelError> {
        let path = format!("/v2/webhooks/{}", subscription_id);
        let request = self.base_request(reqwest::Method::DELETE, &path).await?;
        self.send(request).await?;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        let started = Instant::now();
        let request = match self.base_request(reqwest::Method::GET, "/v2/health").await {
            Ok(r) => r,
            Err(e) => return HealthStatus::unhealthy(0, e.to_string()),
        };

        match self.send(request).await {
            Ok(_) => HealthStatus::healthy(started.elapsed().as_millis() as u64),
            Err(e) => HealthStatus::unhealthy(started.elapsed().as_millis() as u64, e.to_string()),
        }
    }
}
