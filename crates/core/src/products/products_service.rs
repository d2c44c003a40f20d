//! Product service.

use std::sync::Arc;

use async_trait::async_trait;

use super::products_model::{NewProduct, Product};
use super::products_traits::{ProductRepositoryTrait, ProductServiceTrait};
use crate::errors::Result;

pub struct ProductService<R: ProductRepositoryTrait> {
    product_repo: Arc<R>,
}

impl<R: ProductRepositoryTrait> ProductService<R> {
    pub fn new(product_repo: Arc<R>) -> Self {
        ProductService { product_repo }
    }
}

#[async_trait]
impl<R: ProductRepositoryTrait> ProductServiceTrait for ProductService<R> {
    async fn create_product(&self, new_product: NewProduct) -> Result<Product> {
        new_product.validate()?;
        self.product_repo.create(new_product).await
    }

    fn get_product(&self, product_id: &str) -> Result<Product> {
        self.product_repo.get_by_id(product_id)
    }

    fn list_products(&self, tenant_id: &str) -> Result<Vec<Product>> {
        self.product_repo.list(tenant_id)
    }
}
