//! Scheduled polling for channels without (or with unreliable) webhooks.
//!
//! Every `SYNC_INTERVAL_MS`, list each active channel's products, diff the
//! quantities against the last-known snapshot, and enqueue normalized
//! stock-change jobs on the tenant's `sync` queue for anything that moved.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};
use stockclerk_channels::ChannelRegistry;

use crate::channels::ChannelRepositoryTrait;
use crate::errors::Result;
use crate::queue::{JobOptions, JobQueue, QueueName};
use crate::sync::jobs::{self, StockChangedJob};

/// The watcher's polling half.
pub struct PollPipeline {
    tenant_id: String,
    channels: Arc<dyn ChannelRepositoryTrait>,
    registry: Arc<ChannelRegistry>,
    queue: Arc<dyn JobQueue>,
    /// channel_id -> (external_id -> last seen quantity)
    last_seen: DashMap<String, HashMap<String, i64>>,
}

impl PollPipeline {
    pub fn new(
        tenant_id: String,
        channels: Arc<dyn ChannelRepositoryTrait>,
        registry: Arc<ChannelRegistry>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            tenant_id,
            channels,
            registry,
            queue,
            last_seen: DashMap::new(),
        }
    }

    /// One poll pass over every active channel. Failures on one channel are
    /// logged and do not stop the others.
    pub async fn poll_once(&self) -> Result<usize> {
        let channels = self.channels.list(&self.tenant_id, Some(true))?;
        let mut enqueued = 0usize;

        for channel in channels {
            match self.poll_channel(&channel.id).await {
                Ok(count) => enqueued += count,
                Err(e) => warn!("Poll of channel {} failed: {}", channel.id, e),
            }
        }

        Ok(enqueued)
    }

    /// Diff one channel's listing against the snapshot and enqueue changes.
    async fn poll_channel(&self, channel_id: &str) -> Result<usize> {
        let items = self.registry.list_products(channel_id).await?;

        let mut fresh: HashMap<String, i64> = HashMap::with_capacity(items.len());
        let mut enqueued = 0usize;

        for item in &items {
            fresh.insert(item.external_id.clone(), item.quantity);
        }

        // First pass over a channel just primes the snapshot; emitting
        // changes for everything would storm the queue at startup.
        let Some(previous) = self
            .last_seen
            .insert(channel_id.to_string(), fresh.clone())
        else {
            debug!(
                "Primed poll snapshot for channel {} ({} items)",
                channel_id,
                fresh.len()
            );
            return Ok(0);
        };

        for item in &items {
            let last = previous.get(&item.external_id).copied();
            if last == Some(item.quantity) {
                continue;
            }

            // Quantized to the poll tick: the tick timestamp becomes the
            // source stamp, so re-deliveries within one tick dedupe.
            let stamp = format!("poll-{}", chrono::Utc::now().timestamp());
            let idempotency_key =
                format!("{}:{}:{}", channel_id, item.external_id, stamp);
            let payload = StockChangedJob {
                channel_id: channel_id.to_string(),
                external_id: item.external_id.clone(),
                previous_quantity: last,
                new_quantity: Some(item.quantity),
                is_available: Some(item.is_available),
                reason: Some("poll".to_string()),
                idempotency_key: idempotency_key.clone(),
            };

            self.queue
                .enqueue(
                    &self.tenant_id,
                    QueueName::Sync,
                    jobs::names::STOCK_CHANGED,
                    serde_json::to_value(&payload)?,
                    JobOptions::for_queue(QueueName::Sync).with_job_id(idempotency_key),
                )
                .await?;
            enqueued += 1;
        }

        if enqueued > 0 {
            debug!("Poll of channel {} enqueued {} changes", channel_id, enqueued);
        }
        Ok(enqueued)
    }
}
