//! Tenant repository trait.

use super::Tenant;
use crate::errors::Result;

/// Read-only access to tenants. The core never writes this table.
pub trait TenantRepositoryTrait: Send + Sync {
    fn get_by_id(&self, tenant_id: &str) -> Result<Tenant>;

    /// Tenants whose workers should currently be running.
    fn list_active(&self) -> Result<Vec<Tenant>>;
}
