//! Drift detection and repair.
//!
//! Periodically compares the quantity each channel actually advertises
//! against the locally expected value for every mapping, emits
//! `drift.detected` for mismatches, and - within policy - pushes the
//! expected value back. Channels whose health checks fail for several
//! consecutive passes are deactivated.

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};
use stockclerk_channels::{ChannelKind, ChannelRegistry};

use crate::channels::{Channel, ChannelRepositoryTrait, ChannelServiceTrait};
use crate::constants;
use crate::errors::Result;
use crate::events::{EventSink, StockEvent};
use crate::mappings::MappingRepositoryTrait;
use crate::products::ProductRepositoryTrait;
use crate::sync_events::{NewSyncEvent, SyncEventRepositoryTrait};

/// Reconciliation policy.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Absolute drift below or at this value is ignored (default 0: any
    /// mismatch counts).
    pub drift_threshold: i64,
    /// Drift percentage at or above which the pass is flagged critical.
    pub critical_drift_pct: f64,
    /// Drift percentage under which a POS repair would be allowed (when
    /// `repair_pos_automatically` is also set).
    pub auto_repair_threshold_pct: f64,
    /// The POS is the source of truth; it is only written when an operator
    /// opts in. Not settable from the environment.
    pub repair_pos_automatically: bool,
    /// Consecutive failed health passes before a channel is deactivated.
    pub health_failures_before_disconnect: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            drift_threshold: 0,
            critical_drift_pct: constants::DEFAULT_CRITICAL_DRIFT_PCT,
            auto_repair_threshold_pct: constants::DEFAULT_DRIFT_AUTO_REPAIR_THRESHOLD_PCT,
            repair_pos_automatically: false,
            health_failures_before_disconnect:
                constants::DEFAULT_HEALTH_FAILURES_BEFORE_DISCONNECT,
        }
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    pub channels_checked: usize,
    pub mappings_checked: usize,
    pub drifts_detected: usize,
    pub drifts_repaired: usize,
    pub has_critical_drift: bool,
    pub channels_disconnected: usize,
}

/// The guardian loop body. One instance per tenant worker.
pub struct Reconciler {
    tenant_id: String,
    config: ReconcilerConfig,
    products: Arc<dyn ProductRepositoryTrait>,
    channels: Arc<dyn ChannelRepositoryTrait>,
    channel_service: Arc<dyn ChannelServiceTrait>,
    mappings: Arc<dyn MappingRepositoryTrait>,
    sync_events: Arc<dyn SyncEventRepositoryTrait>,
    registry: Arc<ChannelRegistry>,
    events: Arc<dyn EventSink>,
    /// channel_id -> consecutive failed health passes
    health_failures: DashMap<String, u32>,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: String,
        config: ReconcilerConfig,
        products: Arc<dyn ProductRepositoryTrait>,
        channels: Arc<dyn ChannelRepositoryTrait>,
        channel_service: Arc<dyn ChannelServiceTrait>,
        mappings: Arc<dyn MappingRepositoryTrait>,
        sync_events: Arc<dyn SyncEventRepositoryTrait>,
        registry: Arc<ChannelRegistry>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            tenant_id,
            config,
            products,
            channels,
            channel_service,
            mappings,
            sync_events,
            registry,
            events,
            health_failures: DashMap::new(),
        }
    }

    /// One reconciliation pass over every active channel.
    ///
    /// A failure on one mapping is logged and the pass continues; the loop
    /// never aborts half way through a tenant.
    pub async fn run_pass(&self, auto_repair: bool) -> Result<ReconciliationReport> {
        let channels = self.channels.list(&self.tenant_id, Some(true))?;
        let mut report = ReconciliationReport::default();

        for channel in channels {
            report.channels_checked += 1;

            if !self.check_health(&channel, &mut report).await? {
                continue;
            }

            if let Err(e) = self
                .reconcile_channel(&channel, auto_repair, &mut report)
                .await
            {
                warn!(
                    "Reconciliation of channel {} failed, continuing: {}",
                    channel.id, e
                );
            }
        }

        info!(
            "Reconciliation pass for {}: {} channels, {} mappings, {} drifts, {} repaired",
            self.tenant_id,
            report.channels_checked,
            report.mappings_checked,
            report.drifts_detected,
            report.drifts_repaired
        );
        Ok(report)
    }

    /// Health-check a channel; deactivate it after too many consecutive
    /// failures. Returns whether the channel is usable this pass.
    async fn check_health(
        &self,
        channel: &Channel,
        report: &mut ReconciliationReport,
    ) -> Result<bool> {
        let status = self.registry.health_check(&channel.id).await;
        if status.connected {
            self.health_failures.remove(&channel.id);
            return Ok(true);
        }

        let failures = {
            let mut entry = self.health_failures.entry(channel.id.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        warn!(
            "Health check for channel {} failed ({} consecutive): {:?}",
            channel.id, failures, status.error
        );

        if failures >= self.config.health_failures_before_disconnect {
            self.channel_service
                .disconnect_channel(
                    &channel.id,
                    &format!("{} consecutive failed health checks", failures),
                )
                .await?;
            self.health_failures.remove(&channel.id);
            report.channels_disconnected += 1;
        }
        Ok(false)
    }

    /// Compare every mapping on a channel against expected stock.
    async fn reconcile_channel(
        &self,
        channel: &Channel,
        auto_repair: bool,
        report: &mut ReconciliationReport,
    ) -> Result<()> {
        let mappings = self.mappings.list_for_channel(&channel.id)?;

        for mapping in mappings {
            report.mappings_checked += 1;

            let product = match self.products.get_by_id(&mapping.product_id) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Mapping {} references missing product: {}", mapping.id, e);
                    continue;
                }
            };

            let actual = match self
                .registry
                .get_product(&channel.id, &mapping.external_id)
                .await
            {
                Ok(Some(item)) => item.quantity,
                Ok(None) => {
                    warn!(
                        "Item {} missing at vendor for channel {}",
                        mapping.external_id, channel.id
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        "Read of {} on channel {} failed: {}",
                        mapping.external_id, channel.id, e
                    );
                    continue;
                }
            };

            let expected = product.expected_for(channel.kind);
            let drift = actual - expected;
            let drift_pct = (drift.abs() as f64) / (expected.max(1) as f64) * 100.0;

            // A sold-out product still advertised anywhere is always drift:
            // that is exactly the overselling scenario buffers exist for.
            let oversell_risk = expected == 0 && actual > 0;
            if drift.abs() <= self.config.drift_threshold && !oversell_risk {
                continue;
            }

            report.drifts_detected += 1;
            if drift_pct >= self.config.critical_drift_pct {
                report.has_critical_drift = true;
            }

            debug!(
                "Drift on {}/{}: actual {} expected {} ({:+}, {:.1}%)",
                channel.id, mapping.external_id, actual, expected, drift, drift_pct
            );
            self.events.emit(StockEvent::DriftDetected {
                product_id: product.id.clone(),
                channel_id: channel.id.clone(),
                actual,
                expected,
                drift,
                drift_pct,
                auto_repair,
            });

            if auto_repair && self.repair_allowed(channel.kind, drift_pct) {
                self.repair(channel, &mapping.external_id, &product.id, expected, report)
                    .await;
            }
        }

        Ok(())
    }

    /// Repair policy: non-POS channels may always be re-asserted; the POS
    /// only with the explicit operator knob, and then only for small drift.
    fn repair_allowed(&self, kind: ChannelKind, drift_pct: f64) -> bool {
        if kind != ChannelKind::Pos {
            return true;
        }
        self.config.repair_pos_automatically
            && drift_pct < self.config.auto_repair_threshold_pct
    }

    async fn repair(
        &self,
        channel: &Channel,
        external_id: &str,
        product_id: &str,
        expected: i64,
        report: &mut ReconciliationReport,
    ) {
        match self
            .registry
            .set_stock(&channel.id, external_id, expected)
            .await
        {
            Ok(()) => {
                report.drifts_repaired += 1;
                self.events.emit(StockEvent::DriftRepaired {
                    product_id: product_id.to_string(),
                    channel_id: channel.id.clone(),
                    quantity: expected,
                });
                let _ = self
                    .sync_events
                    .append(NewSyncEvent::completed(
                        &self.tenant_id,
                        "drift_repair",
                        Some(&channel.id),
                        Some(product_id),
                        None,
                        Some(expected),
                    ))
                    .await;
            }
            Err(e) => {
                warn!(
                    "Drift repair of {} on channel {} failed: {}",
                    external_id, channel.id, e
                );
                let _ = self
                    .sync_events
                    .append(NewSyncEvent::failed(
                        &self.tenant_id,
                        "drift_repair",
                        Some(&channel.id),
                        Some(product_id),
                        &e.to_string(),
                    ))
                    .await;
            }
        }
    }
}
