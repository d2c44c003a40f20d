//! Mapping repository trait.

use async_trait::async_trait;

use super::mappings_model::{NewMapping, ProductChannelMapping};
use crate::errors::Result;

#[async_trait]
pub trait MappingRepositoryTrait: Send + Sync {
    async fn create(&self, new_mapping: NewMapping) -> Result<ProductChannelMapping>;

    async fn delete(&self, mapping_id: &str) -> Result<usize>;

    fn list_for_product(&self, product_id: &str) -> Result<Vec<ProductChannelMapping>>;

    fn list_for_channel(&self, channel_id: &str) -> Result<Vec<ProductChannelMapping>>;

    /// Reverse lookup used by the watcher: which product does a vendor item
    /// belong to?
    fn find_by_external_id(
        &self,
        channel_id: &str,
        external_id: &str,
    ) -> Result<Option<ProductChannelMapping>>;
}
