use async_trait::async_trait;
use diesel::prelude::*;

use stockclerk_core::errors::Result;
use stockclerk_core::mappings::{MappingRepositoryTrait, NewMapping, ProductChannelMapping};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::product_channel_mappings;
use crate::schema::product_channel_mappings::dsl::*;

use super::model::MappingDB;

pub struct MappingRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl MappingRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl MappingRepositoryTrait for MappingRepository {
    async fn create(&self, new_mapping: NewMapping) -> Result<ProductChannelMapping> {
        let row = MappingDB {
            id: new_mapping
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            product_id: new_mapping.product_id,
            channel_id: new_mapping.channel_id,
            external_id: new_mapping.external_id,
            external_sku: new_mapping.external_sku,
            is_manual: new_mapping.is_manual,
            created_at: chrono::Utc::now().naive_utc(),
        };

        self.writer
            .exec(move |conn| {
                diesel::insert_into(product_channel_mappings::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(row.clone().into())
            })
            .await
    }

    async fn delete(&self, mapping_id: &str) -> Result<usize> {
        let id_owned = mapping_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(product_channel_mappings.find(&id_owned))
                    .execute(conn)
                    .into_core()
            })
            .await
    }

    fn list_for_product(&self, product_id_param: &str) -> Result<Vec<ProductChannelMapping>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = product_channel_mappings
            .select(MappingDB::as_select())
            .filter(product_id.eq(product_id_param))
            .load::<MappingDB>(&mut conn)
            .into_core()?;
        Ok(rows.into_iter().map(ProductChannelMapping::from).collect())
    }

    fn list_for_channel(&self, channel_id_param: &str) -> Result<Vec<ProductChannelMapping>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = product_channel_mappings
            .select(MappingDB::as_select())
            .filter(channel_id.eq(channel_id_param))
            .load::<MappingDB>(&mut conn)
            .into_core()?;
        Ok(rows.into_iter().map(ProductChannelMapping::from).collect())
    }

    fn find_by_external_id(
        &self,
        channel_id_param: &str,
        external_id_param: &str,
    ) -> Result<Option<ProductChannelMapping>> {
        let mut conn = get_connection(&self.pool)?;
        let row = product_channel_mappings
            .select(MappingDB::as_select())
            .filter(channel_id.eq(channel_id_param))
            .filter(external_id.eq(external_id_param))
            .first::<MappingDB>(&mut conn)
            .optional()
            .into_core()?;
        Ok(row.map(ProductChannelMapping::from))
    }
}
