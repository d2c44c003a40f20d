use async_trait::async_trait;
use diesel::prelude::*;

use stockclerk_core::errors::Result;
use stockclerk_core::sync_events::{NewSyncEvent, SyncEventRecord, SyncEventRepositoryTrait};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::sync_events;
use crate::schema::sync_events::dsl::*;

use super::model::SyncEventDB;

pub struct SyncEventRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl SyncEventRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SyncEventRepositoryTrait for SyncEventRepository {
    async fn append(&self, event: NewSyncEvent) -> Result<SyncEventRecord> {
        let row = SyncEventDB {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: event.tenant_id,
            event_type: event.event_type,
            channel_id: event.channel_id,
            product_id: event.product_id,
            old_value: event.old_value,
            new_value: event.new_value,
            status: event.status.as_str().to_string(),
            error_message: event.error_message,
            created_at: chrono::Utc::now().naive_utc(),
        };

        self.writer
            .exec(move |conn| {
                diesel::insert_into(sync_events::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                row.clone().try_into()
            })
            .await
    }

    fn list_recent(&self, tenant_id_param: &str, limit: i64) -> Result<Vec<SyncEventRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_events
            .select(SyncEventDB::as_select())
            .filter(tenant_id.eq(tenant_id_param))
            .order(created_at.desc())
            .limit(limit)
            .load::<SyncEventDB>(&mut conn)
            .into_core()?;
        rows.into_iter().map(SyncEventRecord::try_from).collect()
    }

    fn has_open_event(
        &self,
        product_id_param: &str,
        channel_id_param: &str,
        event_type_param: &str,
    ) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let count: i64 = sync_events
            .filter(product_id.eq(product_id_param))
            .filter(channel_id.eq(channel_id_param))
            .filter(event_type.eq(event_type_param))
            .filter(status.eq_any(["pending", "processing"]))
            .count()
            .get_result(&mut conn)
            .into_core()?;
        Ok(count > 0)
    }

    async fn prune_older_than(&self, tenant_id_param: &str, max_age_secs: u64) -> Result<usize> {
        let tenant_owned = tenant_id_param.to_string();
        let cutoff =
            chrono::Utc::now().naive_utc() - chrono::Duration::seconds(max_age_secs as i64);
        self.writer
            .exec(move |conn| {
                diesel::delete(
                    sync_events
                        .filter(tenant_id.eq(&tenant_owned))
                        .filter(created_at.lt(cutoff)),
                )
                .execute(conn)
                .into_core()
            })
            .await
    }
}
