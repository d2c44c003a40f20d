//! Product repository and service traits.

use async_trait::async_trait;

use super::products_model::{NewProduct, Product};
use crate::errors::Result;

/// Persistence contract for products.
///
/// Stock mutations go through `set_stock`, which the storage layer runs
/// inside its serialized writer so the product row is never written
/// concurrently from within one worker.
#[async_trait]
pub trait ProductRepositoryTrait: Send + Sync {
    async fn create(&self, new_product: NewProduct) -> Result<Product>;

    async fn delete(&self, product_id: &str) -> Result<usize>;

    fn get_by_id(&self, product_id: &str) -> Result<Product>;

    fn get_by_sku(&self, tenant_id: &str, sku: &str) -> Result<Option<Product>>;

    fn list(&self, tenant_id: &str) -> Result<Vec<Product>>;

    /// Products whose `current_stock` is at or below the threshold.
    fn list_below_stock(&self, tenant_id: &str, threshold: i64) -> Result<Vec<Product>>;

    /// Write `current_stock` (already clamped by the caller) and bump
    /// `updated_at`, returning the updated row.
    async fn set_stock(&self, product_id: &str, new_stock: i64) -> Result<Product>;

    async fn set_buffer(&self, product_id: &str, buffer_stock: i64) -> Result<Product>;
}

/// Business operations on products.
#[async_trait]
pub trait ProductServiceTrait: Send + Sync {
    async fn create_product(&self, new_product: NewProduct) -> Result<Product>;

    fn get_product(&self, product_id: &str) -> Result<Product>;

    fn list_products(&self, tenant_id: &str) -> Result<Vec<Product>>;
}
