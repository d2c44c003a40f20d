//! Exponential backoff with full jitter.
//!
//! Delay for attempt `n` (1-based) is drawn uniformly from
//! `[0, min(cap, base * 2^(n-1))]`. A vendor `Retry-After` hint overrides
//! the computed delay when present.

use std::time::Duration;

use rand::Rng;

/// Backoff schedule: exponential growth with full jitter.
#[derive(Clone, Debug)]
pub struct Backoff {
    /// Base delay for the first retry.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// The jittered delay before retry attempt `attempt` (1-based).
    ///
    /// When `retry_after` is present (parsed from the vendor's header) it is
    /// used as-is, capped.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.cap);
        }

        let exp = self.ceiling(attempt);
        if exp.is_zero() {
            return Duration::ZERO;
        }
        rand::thread_rng().gen_range(Duration::ZERO..=exp)
    }

    /// The un-jittered ceiling for attempt `attempt` (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let ceiling = self.base.saturating_mul(1u32 << shift);
        ceiling.min(self.cap)
    }
}
