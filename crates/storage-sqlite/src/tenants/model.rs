use chrono::NaiveDateTime;
use diesel::prelude::*;

use stockclerk_core::tenants::Tenant;

use crate::schema::tenants;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = tenants)]
pub struct TenantDB {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub plan: String,
    pub plan_status: String,
    pub shop_limit: i32,
    pub created_at: NaiveDateTime,
}

impl From<TenantDB> for Tenant {
    fn from(row: TenantDB) -> Self {
        Tenant {
            id: row.id,
            name: row.name,
            slug: row.slug,
            plan: row.plan,
            plan_status: row.plan_status,
            shop_limit: row.shop_limit,
            created_at: row.created_at,
        }
    }
}
