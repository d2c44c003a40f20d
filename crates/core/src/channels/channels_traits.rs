//! Channel repository and service traits.

use async_trait::async_trait;
use stockclerk_channels::ChannelKind;

use super::channels_model::{Channel, NewChannel};
use crate::errors::Result;

/// Persistence contract for channels.
#[async_trait]
pub trait ChannelRepositoryTrait: Send + Sync {
    async fn create(&self, new_channel: NewChannel) -> Result<Channel>;

    async fn delete(&self, channel_id: &str) -> Result<usize>;

    fn get_by_id(&self, channel_id: &str) -> Result<Channel>;

    /// Webhook routing lookup. Only active channels are returned.
    fn find_for_webhook(
        &self,
        tenant_id: &str,
        kind: ChannelKind,
        external_instance_id: &str,
    ) -> Result<Option<Channel>>;

    fn list(&self, tenant_id: &str, is_active_filter: Option<bool>) -> Result<Vec<Channel>>;

    async fn set_active(&self, channel_id: &str, is_active: bool) -> Result<()>;

    async fn touch_last_sync(&self, channel_id: &str) -> Result<()>;
}

/// Business operations on channels.
#[async_trait]
pub trait ChannelServiceTrait: Send + Sync {
    /// Decrypt credentials, connect the provider, register it with the
    /// channel registry, and flip the channel active.
    async fn connect_channel(&self, channel_id: &str) -> Result<()>;

    /// Deregister the provider and flip the channel inactive.
    async fn disconnect_channel(&self, channel_id: &str, reason: &str) -> Result<()>;

    fn get_channel(&self, channel_id: &str) -> Result<Channel>;

    fn list_active_channels(&self, tenant_id: &str) -> Result<Vec<Channel>>;
}
