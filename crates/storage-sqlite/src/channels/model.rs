use chrono::NaiveDateTime;
use diesel::prelude::*;

use stockclerk_channels::ChannelKind;
use stockclerk_core::channels::Channel;
use stockclerk_core::errors::{DatabaseError, Error, Result};

use crate::schema::channels;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = channels)]
pub struct ChannelDB {
    pub id: String,
    pub tenant_id: String,
    pub kind: String,
    pub name: String,
    pub external_instance_id: String,
    pub credentials_encrypted: String,
    pub webhook_secret: Option<String>,
    pub is_active: bool,
    pub last_sync_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl TryFrom<ChannelDB> for Channel {
    type Error = Error;

    fn try_from(row: ChannelDB) -> Result<Self> {
        let kind = ChannelKind::parse(&row.kind).ok_or_else(|| {
            Error::Database(DatabaseError::Internal(format!(
                "channel {} has unknown kind '{}'",
                row.id, row.kind
            )))
        })?;
        Ok(Channel {
            id: row.id,
            tenant_id: row.tenant_id,
            kind,
            name: row.name,
            external_instance_id: row.external_instance_id,
            credentials_encrypted: row.credentials_encrypted,
            webhook_secret: row.webhook_secret,
            is_active: row.is_active,
            last_sync_at: row.last_sync_at,
            created_at: row.created_at,
        })
    }
}
