//! Provider capabilities and rate limiting configuration.

use std::time::Duration;

use crate::signature::SignatureAlgorithm;

/// Describes what a channel provider can do.
///
/// Used by the registry and the agents to decide how to drive a provider:
/// whether quantity writes are meaningful, whether webhooks exist at all
/// (channels without them fall back to polling), and how its webhooks are
/// signed.
#[derive(Clone, Debug)]
pub struct ProviderCapabilities {
    /// Whether the vendor tracks true quantities. Availability-only vendors
    /// interpret `quantity = 0` as unavailable and `> 0` as available.
    pub tracks_quantity: bool,

    /// Whether the vendor can push webhooks. `false` means the watcher must
    /// poll this channel.
    pub supports_webhooks: bool,

    /// Whether `batch_set_stock` maps to a real vendor batch endpoint.
    pub supports_batch_writes: bool,

    /// HMAC algorithm the vendor signs webhook bodies with.
    pub webhook_algorithm: SignatureAlgorithm,
}

/// Rate limiting configuration for a provider.
///
/// Controls how aggressively we call a vendor to avoid hitting their limits
/// and getting blocked.
#[derive(Clone, Debug)]
pub struct RateLimit {
    /// Maximum requests allowed per minute.
    pub requests_per_minute: u32,

    /// Maximum concurrent requests to this provider.
    pub max_concurrency: usize,

    /// Per-operation timeout.
    pub operation_timeout: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            max_concurrency: 5,
            operation_timeout: Duration::from_secs(30),
        }
    }
}
