use diesel::prelude::*;

use stockclerk_core::errors::Result;
use stockclerk_core::tenants::{Tenant, TenantRepositoryTrait};

use crate::db::{get_connection, DbPool};
use crate::errors::IntoCore;
use crate::schema::tenants::dsl::*;

use super::model::TenantDB;

/// Read-only repository over the externally managed tenants table.
pub struct TenantRepository {
    pool: DbPool,
}

impl TenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl TenantRepositoryTrait for TenantRepository {
    fn get_by_id(&self, tenant_id: &str) -> Result<Tenant> {
        let mut conn = get_connection(&self.pool)?;
        let row = tenants
            .select(TenantDB::as_select())
            .find(tenant_id)
            .first::<TenantDB>(&mut conn)
            .into_core()?;
        Ok(row.into())
    }

    fn list_active(&self) -> Result<Vec<Tenant>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = tenants
            .select(TenantDB::as_select())
            .filter(plan_status.eq_any(["active", "trialing"]))
            .order(created_at.asc())
            .load::<TenantDB>(&mut conn)
            .into_core()?;
        Ok(rows.into_iter().map(Tenant::from).collect())
    }
}
