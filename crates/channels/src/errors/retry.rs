//! Retry classification for channel errors.

/// How the caller should react to a failed channel operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Terminal error - retrying will not help.
    Never,
    /// Transient error - retry the same call with exponential backoff.
    WithBackoff,
    /// Rate limited - retry with backoff, honoring any `Retry-After` hint.
    RateLimited,
    /// Credentials rejected - stop calling until they are refreshed.
    Auth,
}

impl RetryClass {
    /// Whether another attempt against the same provider is worthwhile.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::WithBackoff | Self::RateLimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(RetryClass::WithBackoff.is_retryable());
        assert!(RetryClass::RateLimited.is_retryable());
        assert!(!RetryClass::Never.is_retryable());
        assert!(!RetryClass::Auth.is_retryable());
    }
}
