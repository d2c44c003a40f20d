//! The alert agent: evaluates tenant alert rules against bus events and
//! database state, writes alert rows, and schedules delivery.
//!
//! The alert row is always written when a rule matches; what the dedup
//! window suppresses is the *dispatch*, so an oscillating metric produces a
//! full audit trail but a single notification.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::{debug, warn};

use crate::alerts::{
    Alert, AlertKind, AlertRepositoryTrait, AlertRule, AlertSeverity, NewAlert, RuleAction,
};
use crate::constants;
use crate::errors::Result;
use crate::events::StockEvent;
use crate::products::{Product, ProductRepositoryTrait};
use crate::queue::{JobOptions, JobQueue, QueueName};
use crate::sync::jobs::{self, DispatchAlertJob};

/// Default drift percentage a `drift_detected` rule triggers at.
const DEFAULT_DRIFT_RULE_THRESHOLD_PCT: f64 = 15.0;

pub struct AlertAgent {
    tenant_id: String,
    alerts: Arc<dyn AlertRepositoryTrait>,
    products: Arc<dyn ProductRepositoryTrait>,
    queue: Arc<dyn JobQueue>,
    /// Dedup key -> last dispatched instant.
    dispatched: DashMap<String, Instant>,
    dedupe_window: Duration,
}

impl AlertAgent {
    pub fn new(
        tenant_id: String,
        alerts: Arc<dyn AlertRepositoryTrait>,
        products: Arc<dyn ProductRepositoryTrait>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            tenant_id,
            alerts,
            products,
            queue,
            dispatched: DashMap::new(),
            dedupe_window: Duration::from_secs(constants::ALERT_DEDUPE_WINDOW_SECS),
        }
    }

    /// React to one bus event. Called from the worker's bus subscriber loop.
    pub async fn observe(&self, event: &StockEvent) -> Result<()> {
        match event {
            StockEvent::SyncFailed {
                product_id,
                channel_id,
                error,
            } => {
                self.on_sync_failed(product_id, channel_id.as_deref(), error)
                    .await
            }
            StockEvent::DriftDetected {
                product_id,
                channel_id,
                drift,
                drift_pct,
                auto_repair,
                ..
            } => {
                self.on_drift(product_id, channel_id, *drift, *drift_pct, *auto_repair)
                    .await
            }
            StockEvent::ChannelDisconnected { channel_id, reason } => {
                self.on_channel_disconnected(channel_id, reason).await
            }
            StockEvent::StockChange { product_id, .. }
            | StockEvent::SyncCompleted { product_id, .. } => {
                if product_id.is_empty() {
                    return Ok(());
                }
                self.on_stock_moved(product_id).await
            }
            _ => Ok(()),
        }
    }

    async fn on_sync_failed(
        &self,
        product_id: &str,
        channel_id: Option<&str>,
        error: &str,
    ) -> Result<()> {
        for rule in self.rules_of_kind(AlertKind::SyncError)? {
            if !channel_matches(&rule, channel_id) {
                continue;
            }
            self.raise(
                &rule,
                AlertSeverity::Warning,
                format!("Sync failed: {}", error),
                dedupe_key(
                    AlertKind::SyncError,
                    Some(product_id).filter(|p| !p.is_empty()),
                    channel_id,
                ),
                serde_json::json!({ "productId": product_id, "channelId": channel_id }),
            )
            .await?;
        }
        Ok(())
    }

    async fn on_drift(
        &self,
        product_id: &str,
        channel_id: &str,
        drift: i64,
        drift_pct: f64,
        auto_repair: bool,
    ) -> Result<()> {
        for rule in self.rules_of_kind(AlertKind::DriftDetected)? {
            let threshold = rule
                .conditions
                .percentage_threshold
                .unwrap_or(DEFAULT_DRIFT_RULE_THRESHOLD_PCT);
            if drift_pct < threshold
                || !channel_matches(&rule, Some(channel_id))
                || !product_matches(&rule, product_id)
            {
                continue;
            }

            let severity = if drift_pct >= 50.0 {
                AlertSeverity::Critical
            } else if drift_pct >= 25.0 {
                AlertSeverity::Warning
            } else {
                AlertSeverity::Info
            };

            self.raise(
                &rule,
                severity,
                format!(
                    "Stock drift of {:+} ({:.1}%) detected on channel {}",
                    drift, drift_pct, channel_id
                ),
                dedupe_key(AlertKind::DriftDetected, Some(product_id), Some(channel_id)),
                serde_json::json!({
                    "productId": product_id,
                    "channelId": channel_id,
                    "drift": drift,
                    "driftPct": drift_pct,
                    "autoRepair": auto_repair,
                }),
            )
            .await?;
        }
        Ok(())
    }

    /// Channel disconnections always produce an alert; a matching rule only
    /// adds delivery actions.
    async fn on_channel_disconnected(&self, channel_id: &str, reason: &str) -> Result<()> {
        let actions = self
            .rules_of_kind(AlertKind::ChannelDisconnected)?
            .into_iter()
            .filter(|rule| channel_matches(rule, Some(channel_id)))
            .flat_map(|rule| rule.actions)
            .collect::<Vec<_>>();

        let alert = self
            .alerts
            .create(NewAlert {
                tenant_id: self.tenant_id.clone(),
                kind: AlertKind::ChannelDisconnected,
                severity: AlertSeverity::Critical,
                message: format!("Channel {} disconnected: {}", channel_id, reason),
                metadata: Some(
                    serde_json::json!({ "channelId": channel_id, "reason": reason }).to_string(),
                ),
            })
            .await?;

        let key = dedupe_key(AlertKind::ChannelDisconnected, None, Some(channel_id));
        if !actions.is_empty() && self.should_dispatch(&key) {
            self.enqueue_dispatch(&alert, actions).await?;
        }
        Ok(())
    }

    async fn on_stock_moved(&self, product_id: &str) -> Result<()> {
        let rules = self.rules_of_kind(AlertKind::LowStock)?;
        if rules.is_empty() {
            return Ok(());
        }

        let product = self.products.get_by_id(product_id)?;
        for rule in rules {
            if !product_matches(&rule, product_id) {
                continue;
            }

            let threshold = rule.conditions.threshold.unwrap_or(product.buffer_stock);
            if product.current_stock > threshold {
                continue;
            }

            let severity = low_stock_severity(&product, threshold);
            self.raise(
                &rule,
                severity,
                format!(
                    "Low stock: {} ({}) at {} (threshold {})",
                    product.name, product.sku, product.current_stock, threshold
                ),
                dedupe_key(AlertKind::LowStock, Some(product_id), None),
                serde_json::json!({
                    "productId": product_id,
                    "currentStock": product.current_stock,
                    "threshold": threshold,
                }),
            )
            .await?;
        }
        Ok(())
    }

    /// Write the alert row, then dispatch unless the window suppresses it.
    async fn raise(
        &self,
        rule: &AlertRule,
        severity: AlertSeverity,
        message: String,
        key: String,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let alert = self
            .alerts
            .create(NewAlert {
                tenant_id: self.tenant_id.clone(),
                kind: rule.kind,
                severity,
                message,
                metadata: Some(metadata.to_string()),
            })
            .await?;

        if !self.should_dispatch(&key) {
            debug!("Alert {} deduped within window ({})", alert.id, key);
            return Ok(());
        }
        if rule.actions.is_empty() {
            return Ok(());
        }
        self.enqueue_dispatch(&alert, rule.actions.clone()).await
    }

    async fn enqueue_dispatch(&self, alert: &Alert, actions: Vec<RuleAction>) -> Result<()> {
        let payload = DispatchAlertJob {
            alert_id: alert.id.clone(),
            kind: alert.kind.as_str().to_string(),
            severity: alert.severity.as_str().to_string(),
            message: alert.message.clone(),
            actions,
        };
        self.queue
            .enqueue(
                &self.tenant_id,
                QueueName::Alert,
                jobs::names::DISPATCH_ALERT,
                serde_json::to_value(&payload)?,
                JobOptions::for_queue(QueueName::Alert),
            )
            .await?;
        Ok(())
    }

    fn rules_of_kind(&self, kind: AlertKind) -> Result<Vec<AlertRule>> {
        Ok(self
            .alerts
            .list_active_rules(&self.tenant_id)?
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect())
    }

    /// Sliding-window dispatch gate. The row is written regardless.
    fn should_dispatch(&self, key: &str) -> bool {
        let now = Instant::now();
        self.dispatched
            .retain(|_, at| now.duration_since(*at) < self.dedupe_window);

        if self.dispatched.contains_key(key) {
            return false;
        }
        self.dispatched.insert(key.to_string(), now);
        true
    }

    /// Prune read alerts past the retention window.
    pub async fn garbage_collect(&self, max_age_secs: u64) -> Result<usize> {
        let removed = self
            .alerts
            .prune_older_than(&self.tenant_id, max_age_secs)
            .await?;
        if removed > 0 {
            warn!("Pruned {} aged alerts for {}", removed, self.tenant_id);
        }
        Ok(removed)
    }
}

fn low_stock_severity(product: &Product, threshold: i64) -> AlertSeverity {
    if product.current_stock == 0 {
        AlertSeverity::Critical
    } else if product.current_stock <= threshold / 2 {
        AlertSeverity::Warning
    } else {
        AlertSeverity::Info
    }
}

fn dedupe_key(kind: AlertKind, product_id: Option<&str>, channel_id: Option<&str>) -> String {
    format!(
        "{}:{}:{}",
        kind.as_str(),
        product_id.unwrap_or("-"),
        channel_id.unwrap_or("-")
    )
}

fn channel_matches(rule: &AlertRule, channel_id: Option<&str>) -> bool {
    match (&rule.conditions.channel_ids, channel_id) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(ids), Some(id)) => ids.iter().any(|c| c == id),
    }
}

fn product_matches(rule: &AlertRule, product_id: &str) -> bool {
    match &rule.conditions.product_ids {
        None => true,
        Some(ids) => ids.iter().any(|p| p == product_id),
    }
}
