//! Tenant domain model.
//!
//! Tenants are created by the account surface, which is outside this
//! runtime. The core only reads them to discover whose workers to run.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A merchant account owning a catalog and its channel configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub plan: String,
    pub plan_status: String,
    pub shop_limit: i32,
    pub created_at: NaiveDateTime,
}

impl Tenant {
    /// Whether this tenant should have a live worker.
    pub fn is_active(&self) -> bool {
        self.plan_status == "active" || self.plan_status == "trialing"
    }
}
