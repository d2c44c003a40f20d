//! Error types and retry classification for the channels crate.
//!
//! This module provides:
//! - [`ChannelError`]: The main error enum for all channel operations
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to an external sales channel.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method, which determines how the
/// registry and the sync agent should handle the error.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The requested item does not exist at the vendor.
    /// Terminal - retrying won't help.
    #[error("Item not found on {provider}: {external_id}")]
    ItemNotFound {
        provider: String,
        external_id: String,
    },

    /// The vendor rejected the credentials (HTTP 401/403).
    /// The channel needs operator attention; no further attempts until
    /// credentials are refreshed.
    #[error("Authentication failed for {provider}: {message}")]
    AuthenticationFailed { provider: String, message: String },

    /// The vendor rate limited the request (HTTP 429).
    /// Retry with backoff; `retry_after` carries the vendor's hint if present.
    #[error("Rate limited by {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    /// The request to the vendor timed out.
    #[error("Timeout calling {provider}")]
    Timeout { provider: String },

    /// The vendor returned a server-side error (HTTP 5xx) or another
    /// transient condition (408, 423, connection reset).
    #[error("Transient error from {provider}: {message}")]
    Transient { provider: String, message: String },

    /// The vendor returned a non-retryable client error (4xx other than
    /// 408/409/423/429).
    #[error("Vendor rejected request on {provider}: {message}")]
    Rejected { provider: String, message: String },

    /// The vendor payload was missing required fields or otherwise malformed.
    /// Per-provider parsers refuse unknown shapes rather than coerce.
    #[error("Invalid payload from {provider}: {message}")]
    InvalidPayload { provider: String, message: String },

    /// A webhook signature did not verify.
    #[error("Webhook signature verification failed for {provider}")]
    SignatureInvalid { provider: String },

    /// The operation is not supported by this provider.
    #[error("Operation '{operation}' not supported by {provider}")]
    NotSupported { operation: String, provider: String },

    /// The provider has not been connected yet.
    #[error("Provider {provider} is not connected")]
    NotConnected { provider: String },

    /// The circuit breaker is open for this provider.
    #[error("Circuit open for {provider}")]
    CircuitOpen { provider: String },

    /// A network error occurred while communicating with the vendor.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Credential blob could not be interpreted.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

impl ChannelError {
    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::Never`]: fail the operation, record a sync error
    /// - [`RetryClass::WithBackoff`]: retry up to the general attempt budget
    /// - [`RetryClass::RateLimited`]: retry up to the rate-limit attempt
    ///   budget, honoring `Retry-After`
    /// - [`RetryClass::Auth`]: mark the channel unhealthy, stop calling
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::ItemNotFound { .. }
            | Self::Rejected { .. }
            | Self::InvalidPayload { .. }
            | Self::SignatureInvalid { .. }
            | Self::NotSupported { .. }
            | Self::InvalidCredentials(_)
            | Self::CircuitOpen { .. } => RetryClass::Never,

            Self::RateLimited { .. } => RetryClass::RateLimited,

            Self::Timeout { .. } | Self::Transient { .. } | Self::NotConnected { .. } => {
                RetryClass::WithBackoff
            }

            Self::AuthenticationFailed { .. } => RetryClass::Auth,

            Self::Network(e) => {
                if e.is_timeout() || e.is_connect() {
                    RetryClass::WithBackoff
                } else {
                    RetryClass::Never
                }
            }
        }
    }

    /// Classify an HTTP status from a vendor into a `ChannelError`.
    ///
    /// `retry_after` is the parsed `Retry-After` header, when present.
    pub fn from_status(
        provider: &str,
        status: reqwest::StatusCode,
        body: String,
        retry_after: Option<Duration>,
    ) -> Self {
        match status.as_u16() {
            401 | 403 => Self::AuthenticationFailed {
                provider: provider.to_string(),
                message: body,
            },
            404 => Self::ItemNotFound {
                provider: provider.to_string(),
                external_id: body,
            },
            429 => Self::RateLimited {
                provider: provider.to_string(),
                retry_after,
            },
            408 | 409 | 423 => Self::Transient {
                provider: provider.to_string(),
                message: format!("{}: {}", status, body),
            },
            s if s >= 500 => Self::Transient {
                provider: provider.to_string(),
                message: format!("{}: {}", status, body),
            },
            _ => Self::Rejected {
                provider: provider.to_string(),
                message: format!("{}: {}", status, body),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_auth_errors_stop_retrying() {
        let error = ChannelError::AuthenticationFailed {
            provider: "POS".to_string(),
            message: "bad token".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Auth);
    }

    #[test]
    fn test_rate_limited_carries_hint() {
        let error = ChannelError::from_status(
            "STOREFRONT",
            StatusCode::TOO_MANY_REQUESTS,
            String::new(),
            Some(Duration::from_secs(2)),
        );
        match &error {
            ChannelError::RateLimited { retry_after, .. } => {
                assert_eq!(*retry_after, Some(Duration::from_secs(2)));
            }
            other => panic!("Expected RateLimited, got {:?}", other),
        }
        assert_eq!(error.retry_class(), RetryClass::RateLimited);
    }

    #[test]
    fn test_5xx_is_transient() {
        let error = ChannelError::from_status(
            "MARKETPLACE",
            StatusCode::BAD_GATEWAY,
            "upstream down".to_string(),
            None,
        );
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_409_and_423_are_transient() {
        for status in [StatusCode::CONFLICT, StatusCode::LOCKED] {
            let error = ChannelError::from_status("POS", status, String::new(), None);
            assert_eq!(error.retry_class(), RetryClass::WithBackoff);
        }
    }

    #[test]
    fn test_plain_4xx_never_retries() {
        let error = ChannelError::from_status(
            "POS",
            StatusCode::UNPROCESSABLE_ENTITY,
            "bad quantity".to_string(),
            None,
        );
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_malformed_payload_never_retries() {
        let error = ChannelError::InvalidPayload {
            provider: "MARKETPLACE".to_string(),
            message: "missing item_id".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Never);
    }
}
