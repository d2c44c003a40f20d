use async_trait::async_trait;
use diesel::prelude::*;

use stockclerk_channels::ChannelKind;
use stockclerk_core::channels::{Channel, ChannelRepositoryTrait, NewChannel};
use stockclerk_core::errors::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::channels;
use crate::schema::channels::dsl::*;

use super::model::ChannelDB;

pub struct ChannelRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl ChannelRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl ChannelRepositoryTrait for ChannelRepository {
    async fn create(&self, new_channel: NewChannel) -> Result<Channel> {
        new_channel.validate()?;

        let row = ChannelDB {
            id: new_channel
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            tenant_id: new_channel.tenant_id,
            kind: new_channel.kind.as_str().to_string(),
            name: new_channel.name,
            external_instance_id: new_channel.external_instance_id,
            credentials_encrypted: new_channel.credentials_encrypted,
            webhook_secret: new_channel.webhook_secret,
            is_active: false,
            last_sync_at: None,
            created_at: chrono::Utc::now().naive_utc(),
        };

        self.writer
            .exec(move |conn| {
                diesel::insert_into(channels::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                row.clone().try_into()
            })
            .await
    }

    async fn delete(&self, channel_id: &str) -> Result<usize> {
        let id_owned = channel_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(channels.find(&id_owned))
                    .execute(conn)
                    .into_core()
            })
            .await
    }

    fn get_by_id(&self, channel_id: &str) -> Result<Channel> {
        let mut conn = get_connection(&self.pool)?;
        let row = channels
            .select(ChannelDB::as_select())
            .find(channel_id)
            .first::<ChannelDB>(&mut conn)
            .into_core()?;
        row.try_into()
    }

    fn find_for_webhook(
        &self,
        tenant_id_param: &str,
        kind_param: ChannelKind,
        external_instance_id_param: &str,
    ) -> Result<Option<Channel>> {
        let mut conn = get_connection(&self.pool)?;
        let row = channels
            .select(ChannelDB::as_select())
            .filter(tenant_id.eq(tenant_id_param))
            .filter(kind.eq(kind_param.as_str()))
            .filter(external_instance_id.eq(external_instance_id_param))
            .filter(is_active.eq(true))
            .first::<ChannelDB>(&mut conn)
            .optional()
            .into_core()?;
        row.map(Channel::try_from).transpose()
    }

    fn list(
        &self,
        tenant_id_param: &str,
        is_active_filter: Option<bool>,
    ) -> Result<Vec<Channel>> {
        let mut conn = get_connection(&self.pool)?;

        let mut query = channels::table.into_boxed();
        query = query.filter(tenant_id.eq(tenant_id_param));
        if let Some(active) = is_active_filter {
            query = query.filter(is_active.eq(active));
        }

        let rows = query
            .select(ChannelDB::as_select())
            .order(created_at.asc())
            .load::<ChannelDB>(&mut conn)
            .into_core()?;
        rows.into_iter().map(Channel::try_from).collect()
    }

    async fn set_active(&self, channel_id: &str, active: bool) -> Result<()> {
        let id_owned = channel_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::update(channels.find(&id_owned))
                    .set(is_active.eq(active))
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    async fn touch_last_sync(&self, channel_id: &str) -> Result<()> {
        let id_owned = channel_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::update(channels.find(&id_owned))
                    .set(last_sync_at.eq(chrono::Utc::now().naive_utc()))
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }
}
