//! Channel lifecycle service.

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use stockclerk_channels::models::ChannelCredentials;
use stockclerk_channels::provider;
use stockclerk_channels::ChannelRegistry;

use super::channels_model::Channel;
use super::channels_traits::{ChannelRepositoryTrait, ChannelServiceTrait};
use crate::errors::Result;
use crate::events::{EventSink, StockEvent};
use crate::secrets::SecretBox;

/// Connects and disconnects channels, owning credential decryption.
pub struct ChannelService<R: ChannelRepositoryTrait> {
    channel_repo: Arc<R>,
    registry: Arc<ChannelRegistry>,
    secret_box: Arc<SecretBox>,
    events: Arc<dyn EventSink>,
}

impl<R: ChannelRepositoryTrait> ChannelService<R> {
    pub fn new(
        channel_repo: Arc<R>,
        registry: Arc<ChannelRegistry>,
        secret_box: Arc<SecretBox>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        ChannelService {
            channel_repo,
            registry,
            secret_box,
            events,
        }
    }

    fn decrypt_credentials(&self, channel: &Channel) -> Result<ChannelCredentials> {
        let plaintext = self.secret_box.open(&channel.credentials_encrypted)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[async_trait]
impl<R: ChannelRepositoryTrait> ChannelServiceTrait for ChannelService<R> {
    async fn connect_channel(&self, channel_id: &str) -> Result<()> {
        let channel = self.channel_repo.get_by_id(channel_id)?;
        let credentials = self.decrypt_credentials(&channel)?;

        let provider = provider::provider_for(channel.kind);
        provider.connect(&credentials).await?;
        self.registry.register(&channel.id, provider).await;

        if !channel.is_active {
            self.channel_repo.set_active(&channel.id, true).await?;
        }

        info!("Channel {} ({}) connected", channel.id, channel.kind);
        self.events.emit(StockEvent::ChannelConnected {
            channel_id: channel.id,
        });
        Ok(())
    }

    async fn disconnect_channel(&self, channel_id: &str, reason: &str) -> Result<()> {
        self.registry.deregister(channel_id).await;

        if let Err(e) = self.channel_repo.set_active(channel_id, false).await {
            warn!("Failed to deactivate channel {}: {}", channel_id, e);
        }

        info!("Channel {} disconnected: {}", channel_id, reason);
        self.events.emit(StockEvent::ChannelDisconnected {
            channel_id: channel_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn get_channel(&self, channel_id: &str) -> Result<Channel> {
        self.channel_repo.get_by_id(channel_id)
    }

    fn list_active_channels(&self, tenant_id: &str) -> Result<Vec<Channel>> {
        self.channel_repo.list(tenant_id, Some(true))
    }
}
