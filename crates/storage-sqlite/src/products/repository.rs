use async_trait::async_trait;
use diesel::prelude::*;

use stockclerk_core::errors::Result;
use stockclerk_core::products::{NewProduct, Product, ProductRepositoryTrait};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::products;
use crate::schema::products::dsl::*;

use super::model::ProductDB;

pub struct ProductRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl ProductRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl ProductRepositoryTrait for ProductRepository {
    async fn create(&self, new_product: NewProduct) -> Result<Product> {
        new_product.validate()?;

        let now = chrono::Utc::now().naive_utc();
        let row = ProductDB {
            id: new_product
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            tenant_id: new_product.tenant_id,
            sku: new_product.sku,
            name: new_product.name,
            barcode: new_product.barcode,
            current_stock: new_product.current_stock,
            buffer_stock: new_product.buffer_stock,
            metadata: new_product.metadata,
            created_at: now,
            updated_at: now,
        };

        self.writer
            .exec(move |conn| {
                diesel::insert_into(products::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(row.clone().into())
            })
            .await
    }

    async fn delete(&self, product_id: &str) -> Result<usize> {
        let id_owned = product_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(products.find(&id_owned))
                    .execute(conn)
                    .into_core()
            })
            .await
    }

    fn get_by_id(&self, product_id: &str) -> Result<Product> {
        let mut conn = get_connection(&self.pool)?;
        let row = products
            .select(ProductDB::as_select())
            .find(product_id)
            .first::<ProductDB>(&mut conn)
            .into_core()?;
        Ok(row.into())
    }

    fn get_by_sku(&self, tenant_id_param: &str, sku_param: &str) -> Result<Option<Product>> {
        let mut conn = get_connection(&self.pool)?;
        let row = products
            .select(ProductDB::as_select())
            .filter(tenant_id.eq(tenant_id_param))
            .filter(sku.eq(sku_param))
            .first::<ProductDB>(&mut conn)
            .optional()
            .into_core()?;
        Ok(row.map(Product::from))
    }

    fn list(&self, tenant_id_param: &str) -> Result<Vec<Product>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = products
            .select(ProductDB::as_select())
            .filter(tenant_id.eq(tenant_id_param))
            .order(sku.asc())
            .load::<ProductDB>(&mut conn)
            .into_core()?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    fn list_below_stock(&self, tenant_id_param: &str, threshold: i64) -> Result<Vec<Product>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = products
            .select(ProductDB::as_select())
            .filter(tenant_id.eq(tenant_id_param))
            .filter(current_stock.le(threshold))
            .order(current_stock.asc())
            .load::<ProductDB>(&mut conn)
            .into_core()?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// The stock write. Runs on the serialized writer inside an immediate
    /// transaction, which is the row-lock step of the stock-change
    /// algorithm.
    async fn set_stock(&self, product_id: &str, new_stock: i64) -> Result<Product> {
        let id_owned = product_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::update(products.find(&id_owned))
                    .set((
                        current_stock.eq(new_stock),
                        updated_at.eq(chrono::Utc::now().naive_utc()),
                    ))
                    .execute(conn)
                    .into_core()?;

                let row = products
                    .select(ProductDB::as_select())
                    .find(&id_owned)
                    .first::<ProductDB>(conn)
                    .into_core()?;
                Ok(row.into())
            })
            .await
    }

    async fn set_buffer(&self, product_id: &str, new_buffer: i64) -> Result<Product> {
        let id_owned = product_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::update(products.find(&id_owned))
                    .set((
                        buffer_stock.eq(new_buffer),
                        updated_at.eq(chrono::Utc::now().naive_utc()),
                    ))
                    .execute(conn)
                    .into_core()?;

                let row = products
                    .select(ProductDB::as_select())
                    .find(&id_owned)
                    .first::<ProductDB>(conn)
                    .into_core()?;
                Ok(row.into())
            })
            .await
    }
}
