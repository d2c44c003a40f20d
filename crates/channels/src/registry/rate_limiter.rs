//! Token bucket rate limiter for channel providers.
//!
//! Each provider gets a bucket sized from its [`RateLimit`] plus a semaphore
//! bounding concurrent in-flight requests. Acquiring a permit waits for both:
//! a token (requests per minute) and a concurrency slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::provider::RateLimit;

/// Token bucket for a single provider.
#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    /// Refill rate in tokens per second.
    rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn from_limit(limit: &RateLimit) -> Self {
        // Burst capacity of one second's worth of requests, at least 1.
        let capacity = (limit.requests_per_minute as f64 / 60.0).max(1.0);
        Self {
            tokens: capacity,
            capacity,
            rate: limit.requests_per_minute as f64 / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    fn take(&mut self) -> Result<(), Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.rate))
        }
    }
}

struct Entry {
    bucket: Mutex<Bucket>,
    concurrency: Arc<Semaphore>,
}

/// A held rate-limit permit. Dropping it releases the concurrency slot.
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
}

/// Per-provider token bucket rate limiter with bounded concurrency.
///
/// Providers are registered once with their advertised [`RateLimit`];
/// unregistered providers fall back to [`RateLimit::default`].
pub struct RateLimiter {
    entries: Mutex<HashMap<String, Arc<Entry>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or replace) the limit for a provider.
    pub fn register(&self, provider: &str, limit: &RateLimit) {
        let entry = Arc::new(Entry {
            bucket: Mutex::new(Bucket::from_limit(limit)),
            concurrency: Arc::new(Semaphore::new(limit.max_concurrency)),
        });
        self.lock_entries().insert(provider.to_string(), entry);
    }

    /// Acquire a permit for the given provider, waiting for both a token
    /// and a concurrency slot.
    pub async fn acquire(&self, provider: &str) -> RatePermit {
        let entry = self.entry(provider);

        let permit = entry
            .concurrency
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("rate limiter semaphore is never closed"));

        loop {
            let wait = {
                let mut bucket = entry.bucket.lock().unwrap_or_else(|poisoned| {
                    warn!("Rate limiter bucket mutex poisoned, recovering");
                    poisoned.into_inner()
                });
                match bucket.take() {
                    Ok(()) => None,
                    Err(wait) => Some(wait),
                }
            };

            match wait {
                None => {
                    debug!("Rate limiter: token acquired for '{}'", provider);
                    return RatePermit { _permit: permit };
                }
                Some(wait) => {
                    debug!("Rate limiter: waiting {:?} for '{}'", wait, provider);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Try to take a token without waiting. Does not consume a concurrency
    /// slot; used by opportunistic paths like poll scheduling.
    pub fn try_acquire_token(&self, provider: &str) -> bool {
        let entry = self.entry(provider);
        let mut bucket = entry.bucket.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter bucket mutex poisoned, recovering");
            poisoned.into_inner()
        });
        bucket.take().is_ok()
    }

    fn entry(&self, provider: &str) -> Arc<Entry> {
        let mut entries = self.lock_entries();
        entries
            .entry(provider.to_string())
            .or_insert_with(|| {
                let limit = RateLimit::default();
                Arc::new(Entry {
                    bucket: Mutex::new(Bucket::from_limit(&limit)),
                    concurrency: Arc::new(Semaphore::new(limit.max_concurrency)),
                })
            })
            .clone()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Arc<Entry>>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter entries mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(rpm: u32, concurrency: usize) -> RateLimit {
        RateLimit {
            requests_per_minute: rpm,
            max_concurrency: concurrency,
            operation_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_bucket_exhausts_and_reports_wait() {
        let mut bucket = Bucket::from_limit(&limit(60, 5));
        assert!(bucket.take().is_ok());
        let wait = bucket.take().expect_err("bucket should be empty");
        assert!(wait > Duration::ZERO);
    }

    #[test]
    fn test_bucket_refills_over_time() {
        let mut bucket = Bucket::from_limit(&limit(60, 5));
        bucket.take().unwrap();
        // Simulate two seconds elapsed.
        bucket.last_refill = Instant::now() - Duration::from_secs(2);
        assert!(bucket.take().is_ok());
    }

    #[test]
    fn test_providers_are_isolated() {
        let limiter = RateLimiter::new();
        limiter.register("A", &limit(60, 5));
        limiter.register("B", &limit(60, 5));

        assert!(limiter.try_acquire_token("A"));
        assert!(!limiter.try_acquire_token("A"));
        assert!(limiter.try_acquire_token("B"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let limiter = Arc::new(RateLimiter::new());
        limiter.register("POS", &limit(6000, 1));

        let first = limiter.acquire("POS").await;

        // Second acquire cannot complete while the first permit is held.
        let second = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire("POS").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        drop(first);
        second.await.unwrap();
    }

    #[tokio::test]
    async fn test_acquire_waits_for_token() {
        let limiter = RateLimiter::new();
        // 120 rpm = one token every 500ms, capacity 2.
        limiter.register("SLOW", &limit(120, 5));

        let start = Instant::now();
        drop(limiter.acquire("SLOW").await);
        drop(limiter.acquire("SLOW").await);
        drop(limiter.acquire("SLOW").await);
        // The third acquire had to wait for a refill.
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
