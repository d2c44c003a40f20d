//! Channel registry: the single gateway for vendor calls.
//!
//! Every provider call from the agents goes through here, picking up the
//! circuit breaker, the token-bucket rate limiter, the per-operation
//! timeout, and the retry schedule in one place.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::RwLock;

use crate::errors::{ChannelError, RetryClass};
use crate::models::{ChannelItem, HealthStatus};
use crate::provider::ChannelProvider;

use super::backoff::Backoff;
use super::circuit_breaker::CircuitBreaker;
use super::rate_limiter::RateLimiter;

/// Retry budget for vendor calls.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Attempts for general transient errors.
    pub max_attempts: u32,
    /// Attempts when the vendor rate limits us (429).
    pub rate_limit_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_attempts: 5,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    fn budget_for(&self, class: RetryClass) -> u32 {
        match class {
            RetryClass::RateLimited => self.rate_limit_attempts,
            _ => self.max_attempts,
        }
    }
}

/// Registry of connected channel providers, keyed by channel id.
///
/// One provider instance exists per channel (credentials are per channel);
/// the rate limiter and circuit breaker are keyed by the provider id, so
/// two channels on the same vendor share the vendor's budget.
pub struct ChannelRegistry {
    providers: RwLock<HashMap<String, Arc<dyn ChannelProvider>>>,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    retry_policy: RetryPolicy,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(retry_policy: RetryPolicy) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            rate_limiter: RateLimiter::new(),
            circuit_breaker: CircuitBreaker::new(),
            retry_policy,
        }
    }

    /// Register a connected provider for a channel.
    pub async fn register(&self, channel_id: &str, provider: Arc<dyn ChannelProvider>) {
        self.rate_limiter
            .register(provider.id(), &provider.rate_limit());
        self.providers
            .write()
            .await
            .insert(channel_id.to_string(), provider);
    }

    /// Remove a channel's provider, disconnecting it.
    pub async fn deregister(&self, channel_id: &str) {
        let provider = self.providers.write().await.remove(channel_id);
        if let Some(provider) = provider {
            if let Err(e) = provider.disconnect().await {
                warn!("Disconnect for channel {} failed: {}", channel_id, e);
            }
        }
    }

    /// Look up the provider for a channel.
    pub async fn provider(&self, channel_id: &str) -> Option<Arc<dyn ChannelProvider>> {
        self.providers.read().await.get(channel_id).cloned()
    }

    /// Write a stock level through the full retry pipeline.
    pub async fn set_stock(
        &self,
        channel_id: &str,
        external_id: &str,
        quantity: i64,
    ) -> Result<(), ChannelError> {
        let provider = self.require(channel_id).await?;
        let external_id = external_id.to_string();
        self.call(&provider, "set_stock", move |p| {
            let external_id = external_id.clone();
            async move { p.set_stock(&external_id, quantity).await }
        })
        .await
    }

    /// Read one item through the full retry pipeline.
    pub async fn get_product(
        &self,
        channel_id: &str,
        external_id: &str,
    ) -> Result<Option<ChannelItem>, ChannelError> {
        let provider = self.require(channel_id).await?;
        let external_id = external_id.to_string();
        self.call(&provider, "get_product", move |p| {
            let external_id = external_id.clone();
            async move { p.get_product(&external_id).await }
        })
        .await
    }

    /// List a channel's products through the full retry pipeline.
    pub async fn list_products(&self, channel_id: &str) -> Result<Vec<ChannelItem>, ChannelError> {
        let provider = self.require(channel_id).await?;
        self.call(&provider, "list_products", move |p| async move {
            p.list_products().await
        })
        .await
    }

    /// Probe a channel. Health checks bypass retries but still count
    /// against the breaker so persistent failure opens the circuit.
    pub async fn health_check(&self, channel_id: &str) -> HealthStatus {
        let Some(provider) = self.provider(channel_id).await else {
            return HealthStatus::unhealthy(0, format!("channel {} not registered", channel_id));
        };

        let _permit = self.rate_limiter.acquire(provider.id()).await;
        let status = provider.health_check().await;
        if status.connected {
            self.circuit_breaker.record_success(provider.id());
        } else {
            self.circuit_breaker.record_failure(provider.id());
        }
        status
    }

    async fn require(&self, channel_id: &str) -> Result<Arc<dyn ChannelProvider>, ChannelError> {
        self.provider(channel_id)
            .await
            .ok_or_else(|| ChannelError::NotConnected {
                provider: channel_id.to_string(),
            })
    }

    /// Drive one provider operation: breaker check, rate-limit permit,
    /// timeout, classification, and retries per [`RetryPolicy`].
    async fn call<T, F, Fut>(
        &self,
        provider: &Arc<dyn ChannelProvider>,
        operation: &str,
        f: F,
    ) -> Result<T, ChannelError>
    where
        F: Fn(Arc<dyn ChannelProvider>) -> Fut,
        Fut: Future<Output = Result<T, ChannelError>>,
    {
        let provider_id = provider.id();
        let timeout = provider.rate_limit().operation_timeout;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if !self.circuit_breaker.is_allowed(provider_id) {
                return Err(ChannelError::CircuitOpen {
                    provider: provider_id.to_string(),
                });
            }

            let permit = self.rate_limiter.acquire(provider_id).await;
            let result = tokio::time::timeout(timeout, f(provider.clone()))
                .await
                .unwrap_or(Err(ChannelError::Timeout {
                    provider: provider_id.to_string(),
                }));
            drop(permit);

            let error = match result {
                Ok(value) => {
                    self.circuit_breaker.record_success(provider_id);
                    return Ok(value);
                }
                Err(e) => e,
            };

            self.circuit_breaker.record_failure(provider_id);

            let class = error.retry_class();
            let budget = self.retry_policy.budget_for(class);
            if !class.is_retryable() || attempt >= budget {
                debug!(
                    "{} on '{}' failed terminally after {} attempt(s): {}",
                    operation, provider_id, attempt, error
                );
                return Err(error);
            }

            let retry_after = match &error {
                ChannelError::RateLimited { retry_after, .. } => *retry_after,
                _ => None,
            };
            let delay = self.retry_policy.backoff.delay(attempt, retry_after);
            debug!(
                "{} on '{}' attempt {}/{} failed ({}), retrying in {:?}",
                operation, provider_id, attempt, budget, error, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ChannelCredentials, ChannelKind, StockUpdate, WebhookStockChange,
    };
    use crate::provider::{ProviderCapabilities, RateLimit};
    use crate::signature::SignatureAlgorithm;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that fails a configurable number of times before succeeding.
    struct FlakyProvider {
        calls: AtomicU32,
        failures_before_success: u32,
        error_factory: fn() -> ChannelError,
    }

    impl FlakyProvider {
        fn new(failures: u32, error_factory: fn() -> ChannelError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures_before_success: failures,
                error_factory,
            }
        }
    }

    #[async_trait]
    impl ChannelProvider for FlakyProvider {
        fn id(&self) -> &'static str {
            "FLAKY"
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
                requests_per_minute: 60_000,
                max_concurrency: 10,
                operation_timeout: Duration::from_secs(5),
            }
        }
        async fn connect(&self, _credentials: &ChannelCredentials) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn list_products(&self) -> Result<Vec<ChannelItem>, ChannelError> {
            Ok(Vec::new())
        }
        async fn get_product(
            &self,
            _external_id: &str,
        ) -> Result<Option<ChannelItem>, ChannelError> {
            Ok(None)
        }
        async fn set_stock(&self, _external_id: &str, _quantity: i64) -> Result<(), ChannelError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err((self.error_factory)())
            } else {
                Ok(())
            }
        }
        fn parse_webhook(&self, _raw: &[u8]) -> Result<Vec<WebhookStockChange>, ChannelError> {
            Ok(Vec::new())
        }
        async fn subscribe_webhook(
            &self,
            _url: &str,
            _events: &[String],
        ) -> Result<String, ChannelError> {
            Ok("sub".to_string())
        }
        async fn unsubscribe_webhook(&self, _subscription_id: &str) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn health_check(&self) -> HealthStatus {
            HealthStatus::healthy(1)
        }

        async fn batch_set_stock(
            &self,
            _updates: &[StockUpdate],
        ) -> Result<Vec<crate::models::BatchItemResult>, ChannelError> {
            Ok(Vec::new())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            rate_limit_attempts: 5,
            backoff: Backoff {
                base: Duration::from_millis(5),
                cap: Duration::from_millis(20),
            },
        }
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_to_success() {
        let registry = ChannelRegistry::with_policy(fast_policy());
        let provider = Arc::new(FlakyProvider::new(2, || ChannelError::Transient {
            provider: "FLAKY".to_string(),
            message: "502".to_string(),
        }));
        registry.register("ch1", provider.clone()).await;

        registry.set_stock("ch1", "x", 5).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_budget_is_three_attempts() {
        let registry = ChannelRegistry::with_policy(fast_policy());
        let provider = Arc::new(FlakyProvider::new(10, || ChannelError::Transient {
            provider: "FLAKY".to_string(),
            message: "503".to_string(),
        }));
        registry.register("ch1", provider.clone()).await;

        let result = registry.set_stock("ch1", "x", 5).await;
        assert!(result.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limited_gets_five_attempts() {
        let registry = ChannelRegistry::with_policy(fast_policy());
        let provider = Arc::new(FlakyProvider::new(4, || ChannelError::RateLimited {
            provider: "FLAKY".to_string(),
            retry_after: Some(Duration::from_millis(1)),
        }));
        registry.register("ch1", provider.clone()).await;

        registry.set_stock("ch1", "x", 5).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_rejected_is_not_retried() {
        let registry = ChannelRegistry::with_policy(fast_policy());
        let provider = Arc::new(FlakyProvider::new(10, || ChannelError::Rejected {
            provider: "FLAKY".to_string(),
            message: "422".to_string(),
        }));
        registry.register("ch1", provider.clone()).await;

        let result = registry.set_stock("ch1", "x", 5).await;
        assert!(matches!(result, Err(ChannelError::Rejected { .. })));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let registry = ChannelRegistry::with_policy(fast_policy());
        let provider = Arc::new(FlakyProvider::new(10, || {
            ChannelError::AuthenticationFailed {
                provider: "FLAKY".to_string(),
                message: "expired".to_string(),
            }
        }));
        registry.register("ch1", provider.clone()).await;

        let result = registry.set_stock("ch1", "x", 5).await;
        assert!(matches!(
            result,
            Err(ChannelError::AuthenticationFailed { .. })
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregistered_channel_errors() {
        let registry = ChannelRegistry::new();
        let result = registry.set_stock("nope", "x", 5).await;
        assert!(matches!(result, Err(ChannelError::NotConnected { .. })));
    }
}
