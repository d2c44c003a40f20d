//! Alert repository trait.

use async_trait::async_trait;

use super::alerts_model::{Alert, AlertRule, NewAlert};
use crate::errors::Result;

#[async_trait]
pub trait AlertRepositoryTrait: Send + Sync {
    async fn create(&self, new_alert: NewAlert) -> Result<Alert>;

    fn list_unread(&self, tenant_id: &str) -> Result<Vec<Alert>>;

    async fn mark_read(&self, alert_id: &str) -> Result<()>;

    /// Delete read alerts older than the retention window. Returns rows
    /// removed.
    async fn prune_older_than(&self, tenant_id: &str, max_age_secs: u64) -> Result<usize>;

    fn list_active_rules(&self, tenant_id: &str) -> Result<Vec<AlertRule>>;
}
