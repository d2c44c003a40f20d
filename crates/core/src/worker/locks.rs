//! Per-product serialization.
//!
//! Jobs touching the same product within one worker must not interleave.
//! Each product gets a lazily created async mutex; the guard is held for
//! the duration of the job's critical section.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock table keyed by product id.
#[derive(Default)]
pub struct ProductLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a product, waiting if another job holds it.
    pub async fn acquire(&self, product_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(product_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Number of products with a lock entry (for health reporting).
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_product_serializes() {
        let locks = Arc::new(ProductLocks::new());

        let guard = locks.acquire("p1").await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("p1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_products_are_independent() {
        let locks = ProductLocks::new();
        let _a = locks.acquire("p1").await;
        // Would deadlock if locks were shared.
        let _b = locks.acquire("p2").await;
    }
}
