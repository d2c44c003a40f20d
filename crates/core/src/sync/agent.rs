//! The sync agent: applies stock changes from the merchant's source of
//! truth outward.
//!
//! Consumes normalized stock-change jobs, resolves mappings, updates the
//! authoritative product row, and fans the new level out to every other
//! mapped channel with per-channel target quantities.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::{debug, info, warn};
use stockclerk_channels::ChannelRegistry;

use crate::channels::ChannelRepositoryTrait;
use crate::constants;
use crate::errors::{Error, Result};
use crate::events::{EventSink, StockEvent};
use crate::mappings::{MappingRepositoryTrait, ProductChannelMapping};
use crate::products::{Product, ProductRepositoryTrait};
use crate::sync_events::{NewSyncEvent, SyncEventRepositoryTrait};
use crate::worker::ProductLocks;

use super::jobs::{FullSyncJob, IncrementalSyncJob, PushUpdateJob, StockChangedJob};

/// Outcome of one stock-change fan-out.
#[derive(Debug, Clone)]
pub struct FanOutSummary {
    pub product_id: String,
    pub channels_updated: usize,
    pub channels_failed: usize,
}

/// Applies stock changes to the database and the mapped channels.
///
/// One instance lives inside each tenant worker. Jobs touching the same
/// product are serialized by the worker runtime's per-product lock before
/// they reach this agent.
pub struct SyncAgent {
    tenant_id: String,
    products: Arc<dyn ProductRepositoryTrait>,
    channels: Arc<dyn ChannelRepositoryTrait>,
    mappings: Arc<dyn MappingRepositoryTrait>,
    sync_events: Arc<dyn SyncEventRepositoryTrait>,
    registry: Arc<ChannelRegistry>,
    events: Arc<dyn EventSink>,
    locks: Arc<ProductLocks>,
    /// Idempotency keys seen recently, with their first-seen instant.
    seen_keys: DashMap<String, Instant>,
    dedupe_window: Duration,
}

impl SyncAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: String,
        products: Arc<dyn ProductRepositoryTrait>,
        channels: Arc<dyn ChannelRepositoryTrait>,
        mappings: Arc<dyn MappingRepositoryTrait>,
        sync_events: Arc<dyn SyncEventRepositoryTrait>,
        registry: Arc<ChannelRegistry>,
        events: Arc<dyn EventSink>,
        locks: Arc<ProductLocks>,
    ) -> Self {
        Self {
            tenant_id,
            products,
            channels,
            mappings,
            sync_events,
            registry,
            events,
            locks,
            seen_keys: DashMap::new(),
            dedupe_window: Duration::from_secs(constants::IDEMPOTENCY_WINDOW_SECS),
        }
    }

    /// Handle a normalized stock change from a webhook or poll.
    pub async fn handle_stock_changed(&self, job: StockChangedJob) -> Result<()> {
        if self.is_duplicate(&job.idempotency_key) {
            debug!("Skipping duplicate stock change {}", job.idempotency_key);
            return Ok(());
        }

        let Some(mapping) = self
            .mappings
            .find_by_external_id(&job.channel_id, &job.external_id)?
        else {
            debug!(
                "No mapping for {} on channel {}, dropping stock change",
                job.external_id, job.channel_id
            );
            return Ok(());
        };

        // Availability-only flip: the merchant's count is not affected.
        // Re-assert our expected value on the source channel instead so an
        // accidental vendor-side toggle gets corrected.
        if job.new_quantity.is_none() {
            info!(
                "Availability flip for {} on {}; re-asserting expected stock",
                job.external_id, job.channel_id
            );
            return self
                .handle_push_update(PushUpdateJob {
                    product_id: mapping.product_id,
                    channel_id: job.channel_id,
                })
                .await;
        }

        let _guard = self.locks.acquire(&mapping.product_id).await;

        // Read the row only after the lock is held; an earlier job for the
        // same product may just have rewritten it.
        let product = self.products.get_by_id(&mapping.product_id)?;
        let source_channel = self.channels.get_by_id(&job.channel_id)?;

        let reported = job
            .new_quantity
            .unwrap_or_else(|| unreachable!("availability flips handled above"));
        // The vendor reported what it now advertises; reconstruct the
        // merchant's total from the channel's point of view.
        let new_stock = if source_channel.kind.is_buffered() {
            match job.previous_quantity {
                Some(previous) => product.current_stock + (reported - previous),
                None => reported + product.buffer_stock,
            }
        } else {
            reported
        };

        self.apply_stock_change(
            &product,
            new_stock,
            Some(&job.channel_id),
            job.reason.as_deref().unwrap_or("webhook"),
        )
        .await?;
        Ok(())
    }

    /// The core algorithm: update the authoritative row, then fan out.
    pub async fn apply_stock_change(
        &self,
        product: &Product,
        new_stock: i64,
        source_channel_id: Option<&str>,
        reason: &str,
    ) -> Result<FanOutSummary> {
        let old_stock = product.current_stock;

        // Negative stock is clamped to zero and recorded as a sync error,
        // but the sync itself continues.
        let clamped = new_stock < 0;
        let new_stock = new_stock.max(0);
        if clamped {
            warn!(
                "Stock for product {} would go negative ({}), clamping to 0",
                product.id, new_stock
            );
            self.sync_events
                .append(NewSyncEvent::failed(
                    &self.tenant_id,
                    "sync_error",
                    source_channel_id,
                    Some(&product.id),
                    "computed stock was negative; clamped to 0",
                ))
                .await?;
        }

        let updated = self.products.set_stock(&product.id, new_stock).await?;

        self.sync_events
            .append(NewSyncEvent::completed(
                &self.tenant_id,
                "stock_changed",
                source_channel_id,
                Some(&product.id),
                Some(old_stock),
                Some(new_stock),
            ))
            .await?;

        let summary = self
            .fan_out(&updated, source_channel_id, reason)
            .await?;
        Ok(summary)
    }

    /// Push the product's expected quantity to every mapped channel except
    /// the source.
    async fn fan_out(
        &self,
        product: &Product,
        source_channel_id: Option<&str>,
        reason: &str,
    ) -> Result<FanOutSummary> {
        let mappings = self.mappings.list_for_product(&product.id)?;
        let mut updated = 0usize;
        let mut failed = 0usize;
        let mut first_error: Option<(String, String)> = None;

        for mapping in &mappings {
            if source_channel_id == Some(mapping.channel_id.as_str()) {
                // The source is already consistent.
                continue;
            }

            let channel = match self.channels.get_by_id(&mapping.channel_id) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Mapping {} references unknown channel: {}", mapping.id, e);
                    continue;
                }
            };
            if !channel.is_active {
                continue;
            }

            let target = product.expected_for(channel.kind);
            match self.push_to_mapping(product, mapping, target).await {
                Ok(()) => {
                    updated += 1;
                    self.events.emit(StockEvent::StockChange {
                        product_id: product.id.clone(),
                        channel_id: mapping.channel_id.clone(),
                        old_quantity: product.current_stock,
                        new_quantity: target,
                    });
                }
                Err(e) => {
                    failed += 1;
                    if first_error.is_none() {
                        first_error = Some((mapping.channel_id.clone(), e.to_string()));
                    }
                }
            }
        }

        if let Some((channel_id, error)) = first_error {
            self.events.emit(StockEvent::SyncFailed {
                product_id: product.id.clone(),
                channel_id: Some(channel_id),
                error,
            });
        } else {
            self.events.emit(StockEvent::SyncCompleted {
                product_id: product.id.clone(),
                source_channel_id: source_channel_id.map(str::to_string),
                channels_updated: updated,
            });
        }

        debug!(
            "Fan-out for product {} ({}): {} updated, {} failed",
            product.id, reason, updated, failed
        );
        Ok(FanOutSummary {
            product_id: product.id.clone(),
            channels_updated: updated,
            channels_failed: failed,
        })
    }

    /// Write one mapping's target quantity, recording the attempt in the
    /// audit log.
    async fn push_to_mapping(
        &self,
        product: &Product,
        mapping: &ProductChannelMapping,
        target: i64,
    ) -> Result<()> {
        let result = self
            .registry
            .set_stock(&mapping.channel_id, &mapping.external_id, target)
            .await;

        match result {
            Ok(()) => {
                self.sync_events
                    .append(NewSyncEvent::completed(
                        &self.tenant_id,
                        "push_update",
                        Some(&mapping.channel_id),
                        Some(&product.id),
                        None,
                        Some(target),
                    ))
                    .await?;
                self.channels.touch_last_sync(&mapping.channel_id).await?;
                Ok(())
            }
            Err(e) => {
                self.sync_events
                    .append(NewSyncEvent::failed(
                        &self.tenant_id,
                        "push_update",
                        Some(&mapping.channel_id),
                        Some(&product.id),
                        &e.to_string(),
                    ))
                    .await?;
                Err(Error::Channel(e))
            }
        }
    }

    /// Push the current expected quantity of one product to one channel.
    pub async fn handle_push_update(&self, job: PushUpdateJob) -> Result<()> {
        let _guard = self.locks.acquire(&job.product_id).await;
        let product = self.products.get_by_id(&job.product_id)?;
        let channel = self.channels.get_by_id(&job.channel_id)?;

        let Some(mapping) = self
            .mappings
            .list_for_product(&product.id)?
            .into_iter()
            .find(|m| m.channel_id == job.channel_id)
        else {
            debug!(
                "Product {} has no mapping on channel {}, nothing to push",
                job.product_id, job.channel_id
            );
            return Ok(());
        };

        let target = product.expected_for(channel.kind);
        self.push_to_mapping(&product, &mapping, target).await?;
        self.events.emit(StockEvent::StockChange {
            product_id: product.id.clone(),
            channel_id: channel.id,
            old_quantity: product.current_stock,
            new_quantity: target,
        });
        Ok(())
    }

    /// Walk all mappings for a channel and push each.
    pub async fn handle_full_sync(&self, job: FullSyncJob) -> Result<()> {
        let channel = self.channels.get_by_id(&job.channel_id)?;
        let mappings = self.mappings.list_for_channel(&job.channel_id)?;
        info!(
            "Full sync for channel {} ({} mappings)",
            job.channel_id,
            mappings.len()
        );

        let mut failed = 0usize;
        for mapping in &mappings {
            let _guard = self.locks.acquire(&mapping.product_id).await;
            let product = self.products.get_by_id(&mapping.product_id)?;
            let target = product.expected_for(channel.kind);
            if self.push_to_mapping(&product, mapping, target).await.is_err() {
                failed += 1;
            }
        }

        self.channels.touch_last_sync(&job.channel_id).await?;
        if failed > 0 {
            self.events.emit(StockEvent::SyncFailed {
                product_id: String::new(),
                channel_id: Some(job.channel_id.clone()),
                error: format!("{} of {} pushes failed", failed, mappings.len()),
            });
        }
        Ok(())
    }

    /// Poll a channel's current listing and reconcile differences into
    /// local state, treating the channel as the source.
    pub async fn handle_incremental_sync(&self, job: IncrementalSyncJob) -> Result<()> {
        let channel = self.channels.get_by_id(&job.channel_id)?;
        let items = self.registry.list_products(&job.channel_id).await?;
        debug!(
            "Incremental sync for channel {} since {:?}: {} items",
            job.channel_id,
            job.since,
            items.len()
        );

        for item in items {
            let Some(mapping) = self
                .mappings
                .find_by_external_id(&job.channel_id, &item.external_id)?
            else {
                continue;
            };

            let _guard = self.locks.acquire(&mapping.product_id).await;
            let product = self.products.get_by_id(&mapping.product_id)?;
            let expected = product.expected_for(channel.kind);
            if item.quantity == expected {
                continue;
            }

            let new_stock = if channel.kind.is_buffered() {
                item.quantity + product.buffer_stock
            } else {
                item.quantity
            };
            self.apply_stock_change(&product, new_stock, Some(&job.channel_id), "incremental_sync")
                .await?;
        }

        self.channels.touch_last_sync(&job.channel_id).await?;
        Ok(())
    }

    /// Whether this idempotency key was already applied within the window.
    fn is_duplicate(&self, key: &str) -> bool {
        let now = Instant::now();
        self.seen_keys
            .retain(|_, seen| now.duration_since(*seen) < self.dedupe_window);

        if self.seen_keys.contains_key(key) {
            return true;
        }
        self.seen_keys.insert(key.to_string(), now);
        false
    }
}
