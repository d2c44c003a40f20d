//! Sync event repository trait.

use async_trait::async_trait;

use super::sync_events_model::{NewSyncEvent, SyncEventRecord};
use crate::errors::Result;

/// Append-only audit log of sync attempts.
#[async_trait]
pub trait SyncEventRepositoryTrait: Send + Sync {
    async fn append(&self, event: NewSyncEvent) -> Result<SyncEventRecord>;

    fn list_recent(&self, tenant_id: &str, limit: i64) -> Result<Vec<SyncEventRecord>>;

    /// Whether an in-flight event already exists for this tuple. Enforces
    /// at most one `pending`/`processing` event per (product, channel,
    /// cause).
    fn has_open_event(
        &self,
        product_id: &str,
        channel_id: &str,
        event_type: &str,
    ) -> Result<bool>;

    /// Delete events older than the retention window. Returns rows removed.
    async fn prune_older_than(&self, tenant_id: &str, max_age_secs: u64) -> Result<usize>;
}
