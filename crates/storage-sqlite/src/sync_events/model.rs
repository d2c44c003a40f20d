use chrono::NaiveDateTime;
use diesel::prelude::*;

use stockclerk_core::errors::{DatabaseError, Error, Result};
use stockclerk_core::sync_events::{SyncEventRecord, SyncEventStatus};

use crate::schema::sync_events;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = sync_events)]
pub struct SyncEventDB {
    pub id: String,
    pub tenant_id: String,
    pub event_type: String,
    pub channel_id: Option<String>,
    pub product_id: Option<String>,
    pub old_value: Option<i64>,
    pub new_value: Option<i64>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
}

impl TryFrom<SyncEventDB> for SyncEventRecord {
    type Error = Error;

    fn try_from(row: SyncEventDB) -> Result<Self> {
        let status = SyncEventStatus::parse(&row.status).ok_or_else(|| {
            Error::Database(DatabaseError::Internal(format!(
                "sync event {} has unknown status '{}'",
                row.id, row.status
            )))
        })?;
        Ok(SyncEventRecord {
            id: row.id,
            tenant_id: row.tenant_id,
            event_type: row.event_type,
            channel_id: row.channel_id,
            product_id: row.product_id,
            old_value: row.old_value,
            new_value: row.new_value,
            status,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}
