use chrono::NaiveDateTime;
use diesel::prelude::*;

use stockclerk_core::mappings::ProductChannelMapping;

use crate::schema::product_channel_mappings;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = product_channel_mappings)]
pub struct MappingDB {
    pub id: String,
    pub product_id: String,
    pub channel_id: String,
    pub external_id: String,
    pub external_sku: Option<String>,
    pub is_manual: bool,
    pub created_at: NaiveDateTime,
}

impl From<MappingDB> for ProductChannelMapping {
    fn from(row: MappingDB) -> Self {
        ProductChannelMapping {
            id: row.id,
            product_id: row.product_id,
            channel_id: row.channel_id,
            external_id: row.external_id,
            external_sku: row.external_sku,
            is_manual: row.is_manual,
            created_at: row.created_at,
        }
    }
}
