//! Channel provider implementations.
//!
//! One provider per sales channel kind, all behind the [`ChannelProvider`]
//! facade:
//! - [`pos::PosProvider`] - point-of-sale terminal (source of truth)
//! - [`storefront::StorefrontProvider`] - online storefront
//! - [`marketplace::MarketplaceProvider`] - food-delivery marketplace

pub mod capabilities;
pub mod marketplace;
pub mod pos;
pub mod storefront;
pub mod traits;

pub use capabilities::{ProviderCapabilities, RateLimit};
pub use marketplace::MarketplaceProvider;
pub use pos::PosProvider;
pub use storefront::StorefrontProvider;
pub use traits::ChannelProvider;

use std::sync::Arc;
use std::time::Duration;

use crate::models::ChannelKind;

/// Construct the provider for a channel kind.
pub fn provider_for(kind: ChannelKind) -> Arc<dyn ChannelProvider> {
    match kind {
        ChannelKind::Pos => Arc::new(PosProvider::new()),
        ChannelKind::OnlineStore => Arc::new(StorefrontProvider::new()),
        ChannelKind::DeliveryMarketplace => Arc::new(MarketplaceProvider::new()),
    }
}

/// Parse a `Retry-After` header (seconds form) from a vendor response.
pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_retry_after_absent_or_http_date() {
        assert_eq!(retry_after(&HeaderMap::new()), None);

        // HTTP-date form is ignored; backoff falls back to the schedule.
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_provider_for_kinds() {
        assert_eq!(provider_for(ChannelKind::Pos).id(), "POS");
        assert_eq!(provider_for(ChannelKind::OnlineStore).id(), "STOREFRONT");
        assert_eq!(
            provider_for(ChannelKind::DeliveryMarketplace).id(),
            "MARKETPLACE"
        );
    }
}
