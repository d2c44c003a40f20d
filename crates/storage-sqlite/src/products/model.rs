use chrono::NaiveDateTime;
use diesel::prelude::*;

use stockclerk_core::products::Product;

use crate::schema::products;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = products)]
pub struct ProductDB {
    pub id: String,
    pub tenant_id: String,
    pub sku: String,
    pub name: String,
    pub barcode: Option<String>,
    pub current_stock: i64,
    pub buffer_stock: i64,
    pub metadata: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<ProductDB> for Product {
    fn from(row: ProductDB) -> Self {
        Product {
            id: row.id,
            tenant_id: row.tenant_id,
            sku: row.sku,
            name: row.name,
            barcode: row.barcode,
            current_stock: row.current_stock,
            buffer_stock: row.buffer_stock,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
