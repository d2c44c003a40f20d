//! The tenant worker runtime.
//!
//! Hosts the five agents for exactly one tenant: queue consumer loops with
//! bounded concurrency, the watcher's poll timer, the reconciliation timer,
//! and the alert agent's bus subscription. Each agent is a long-running
//! loop whose body is one job; per-job state lives on the stack and
//! cancellation is a token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alerting::{AlertAgent, AlertDispatcher, EmailSender};
use crate::constants;
use crate::errors::Result;
use crate::events::EventSink;
use crate::mappings::{propose_matches, MatcherConfig, NewMapping};
use crate::queue::{JobOptions, JobRecord, QueueDepth, QueueName};
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::sync::jobs::{self, FullSyncJob, PushUpdateJob};
use crate::sync::SyncAgent;
use crate::watcher::{PollPipeline, WebhookDelivery, WebhookOutcome, WebhookPipeline};
use crate::worker::{ProductLocks, WorkerContext};

/// How long an idle consumer sleeps before re-polling its queue.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Scope of an operator-triggered sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope")]
pub enum SyncScope {
    /// Every active channel.
    Full,
    /// One channel, all its mappings.
    Channel { channel_id: String },
    /// One product, all its mappings.
    Product { product_id: String },
}

/// Snapshot sent to the orchestrator in `health_report` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerHealth {
    pub tenant_id: String,
    pub queues: HashMap<String, QueueDepth>,
    pub tracked_products: usize,
    /// Resident set size, when the platform exposes it.
    pub rss_mb: Option<u64>,
}

/// One tenant's agent host.
pub struct WorkerRuntime {
    context: Arc<WorkerContext>,
    sync_agent: Arc<SyncAgent>,
    reconciler: Arc<Reconciler>,
    alert_agent: Arc<AlertAgent>,
    webhooks: Arc<WebhookPipeline>,
    poller: Arc<PollPipeline>,
    dispatcher: Arc<AlertDispatcher>,
    locks: Arc<ProductLocks>,
    cancel: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerRuntime {
    pub fn new(context: WorkerContext, email: Arc<dyn EmailSender>) -> Self {
        let context = Arc::new(context);
        let bus_sink: Arc<dyn EventSink> = Arc::new(context.bus.clone());
        let locks = Arc::new(ProductLocks::new());

        let sync_agent = Arc::new(SyncAgent::new(
            context.tenant_id.clone(),
            context.products.clone(),
            context.channels.clone(),
            context.mappings.clone(),
            context.sync_events.clone(),
            context.registry.clone(),
            bus_sink.clone(),
            locks.clone(),
        ));

        let reconciler = Arc::new(Reconciler::new(
            context.tenant_id.clone(),
            ReconcilerConfig {
                auto_repair_threshold_pct: context.settings.drift_auto_repair_threshold_pct,
                ..ReconcilerConfig::default()
            },
            context.products.clone(),
            context.channels.clone(),
            context.channel_service.clone(),
            context.mappings.clone(),
            context.sync_events.clone(),
            context.registry.clone(),
            bus_sink.clone(),
        ));

        let alert_agent = Arc::new(AlertAgent::new(
            context.tenant_id.clone(),
            context.alerts.clone(),
            context.products.clone(),
            context.queue.clone(),
        ));

        let webhooks = Arc::new(WebhookPipeline::new(
            context.tenant_id.clone(),
            context.channels.clone(),
            context.queue.clone(),
        ));

        let poller = Arc::new(PollPipeline::new(
            context.tenant_id.clone(),
            context.channels.clone(),
            context.registry.clone(),
            context.queue.clone(),
        ));

        let dispatcher = Arc::new(AlertDispatcher::new(bus_sink, email));

        Self {
            context,
            sync_agent,
            reconciler,
            alert_agent,
            webhooks,
            poller,
            dispatcher,
            locks,
            cancel: CancellationToken::new(),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Connect channels and start every agent loop. Returns once the worker
    /// is fully running; the loops continue in the background until
    /// [`shutdown`](Self::shutdown).
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        // Connect providers for every active channel. A channel that fails
        // to connect is logged and left for the reconciler's health loop.
        let channels = self
            .context
            .channels
            .list(&self.context.tenant_id, Some(true))?;
        for channel in &channels {
            if let Err(e) = self.context.channel_service.connect_channel(&channel.id).await {
                warn!("Channel {} failed to connect at startup: {}", channel.id, e);
            }
        }
        info!(
            "Worker for tenant {} starting with {} channel(s)",
            self.context.tenant_id,
            channels.len()
        );

        // Link catalog products that gained a vendor-side counterpart while
        // the worker was down. Manual mappings always survive this pass.
        for channel in &channels {
            match self.auto_match_channel(&channel.id).await {
                Ok(0) => {}
                Ok(created) => info!(
                    "Auto-matched {} item(s) on channel {}",
                    created, channel.id
                ),
                Err(e) => warn!("Auto-match on channel {} failed: {}", channel.id, e),
            }
        }

        // Jobs claimed by a previous incarnation of this worker go back to
        // waiting before any consumer runs; their attempt counts stand, so
        // the attempts budget survives a reboot mid-sync.
        let recovered = self
            .context
            .queue
            .recover_stale(&self.context.tenant_id)
            .await?;
        if recovered > 0 {
            info!("Recovered {} job(s) from a previous worker run", recovered);
        }

        let mut tasks = Vec::new();

        // Queue consumers with bounded concurrency.
        for queue in QueueName::ALL {
            for slot in 0..queue.concurrency() {
                let runtime = self.clone();
                tasks.push(tokio::spawn(async move {
                    runtime.consume(queue, slot).await;
                }));
            }
        }

        // Watcher poll timer.
        {
            let runtime = self.clone();
            let interval = self.context.settings.sync_interval();
            tasks.push(tokio::spawn(async move {
                runtime.poll_loop(interval).await;
            }));
        }

        // Guardian timer.
        {
            let runtime = self.clone();
            let interval = self.context.settings.reconciliation_interval();
            tasks.push(tokio::spawn(async move {
                runtime.reconcile_loop(interval).await;
            }));
        }

        // Alert agent bus subscription.
        {
            let runtime = self.clone();
            tasks.push(tokio::spawn(async move {
                runtime.alert_loop().await;
            }));
        }

        // Retention pass.
        {
            let runtime = self.clone();
            tasks.push(tokio::spawn(async move {
                runtime.prune_loop().await;
            }));
        }

        self.tasks.lock().unwrap().extend(tasks);
        Ok(())
    }

    /// Stop accepting jobs, drain in-flight work up to the grace budget,
    /// then abort what is left.
    pub async fn shutdown(&self, graceful: bool) {
        info!(
            "Worker for tenant {} shutting down (graceful: {})",
            self.context.tenant_id, graceful
        );
        self.cancel.cancel();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        if graceful {
            let drain = async {
                for task in &tasks {
                    // Cooperative loops observe the token and finish their
                    // current job before returning.
                    while !task.is_finished() {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            };
            if tokio::time::timeout(Duration::from_secs(constants::SHUTDOWN_DRAIN_SECS), drain)
                .await
                .is_err()
            {
                warn!(
                    "Worker for tenant {} exceeded drain budget",
                    self.context.tenant_id
                );
            }
        }
        for task in tasks {
            task.abort();
        }
    }

    /// Operator-triggered sync. Enqueues; the consumers do the work.
    pub async fn trigger_sync(&self, scope: SyncScope) -> Result<usize> {
        match scope {
            SyncScope::Full => {
                let channels = self
                    .context
                    .channels
                    .list(&self.context.tenant_id, Some(true))?;
                let mut enqueued = 0;
                for channel in channels {
                    self.enqueue_full_sync(&channel.id).await?;
                    enqueued += 1;
                }
                Ok(enqueued)
            }
            SyncScope::Channel { channel_id } => {
                self.enqueue_full_sync(&channel_id).await?;
                Ok(1)
            }
            SyncScope::Product { product_id } => {
                let mappings = self.context.mappings.list_for_product(&product_id)?;
                let count = mappings.len();
                for mapping in mappings {
                    let payload = PushUpdateJob {
                        product_id: product_id.clone(),
                        channel_id: mapping.channel_id,
                    };
                    self.context
                        .queue
                        .enqueue(
                            &self.context.tenant_id,
                            QueueName::StockUpdate,
                            jobs::names::PUSH_UPDATE,
                            serde_json::to_value(&payload)?,
                            JobOptions::for_queue(QueueName::StockUpdate),
                        )
                        .await?;
                }
                Ok(count)
            }
        }
    }

    /// Webhook intake entry point, called from the IPC layer.
    pub async fn handle_webhook(&self, delivery: WebhookDelivery) -> Result<WebhookOutcome> {
        self.webhooks.handle(delivery).await
    }

    /// Propose and persist mappings for a channel's unmapped items.
    ///
    /// Products already mapped on the channel are not candidates, and
    /// already-mapped items (manual ones included) are skipped entirely.
    /// Returns the number of mappings created.
    pub async fn auto_match_channel(&self, channel_id: &str) -> Result<usize> {
        let items = self.context.registry.list_products(channel_id).await?;
        let existing = self.context.mappings.list_for_channel(channel_id)?;

        let mapped_external: Vec<String> =
            existing.iter().map(|m| m.external_id.clone()).collect();
        let candidates: Vec<crate::products::Product> = self
            .context
            .products
            .list(&self.context.tenant_id)?
            .into_iter()
            .filter(|p| !existing.iter().any(|m| m.product_id == p.id))
            .collect();

        let proposals = propose_matches(
            &candidates,
            &items,
            &mapped_external,
            &MatcherConfig::default(),
        );

        let mut created = 0usize;
        for proposal in &proposals {
            self.context
                .mappings
                .create(NewMapping {
                    id: None,
                    product_id: proposal.product.id.clone(),
                    channel_id: channel_id.to_string(),
                    external_id: proposal.item.external_id.clone(),
                    external_sku: proposal.item.sku.clone(),
                    is_manual: false,
                })
                .await?;
            created += 1;
        }
        Ok(created)
    }

    /// Operator-triggered reconciliation, run inline.
    pub async fn trigger_reconciliation(
        &self,
        auto_repair: bool,
    ) -> Result<crate::reconciler::ReconciliationReport> {
        self.reconciler.run_pass(auto_repair).await
    }

    /// The worker's event bus, for IPC relaying.
    pub fn bus(&self) -> &crate::events::EventBus {
        &self.context.bus
    }

    /// Health snapshot for IPC reporting.
    pub fn health(&self) -> WorkerHealth {
        let mut queues = HashMap::new();
        for queue in QueueName::ALL {
            if let Ok(depth) = self.context.queue.depth(&self.context.tenant_id, queue) {
                queues.insert(queue.as_str().to_string(), depth);
            }
        }
        WorkerHealth {
            tenant_id: self.context.tenant_id.clone(),
            queues,
            tracked_products: self.locks.len(),
            rss_mb: read_rss_mb(),
        }
    }

    async fn enqueue_full_sync(&self, channel_id: &str) -> Result<()> {
        let payload = FullSyncJob {
            channel_id: channel_id.to_string(),
        };
        self.context
            .queue
            .enqueue(
                &self.context.tenant_id,
                QueueName::Sync,
                jobs::names::FULL_SYNC,
                serde_json::to_value(&payload)?,
                JobOptions::for_queue(QueueName::Sync),
            )
            .await?;
        Ok(())
    }

    /// One consumer slot: claim, run, settle, repeat.
    async fn consume(self: Arc<Self>, queue: QueueName, slot: usize) {
        debug!(
            "Consumer {}/{} for tenant {} up",
            queue, slot, self.context.tenant_id
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let job = match self
                .context
                .queue
                .fetch_next(&self.context.tenant_id, queue)
                .await
            {
                Ok(Some(job)) => job,
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL) => continue,
                        _ = self.cancel.cancelled() => break,
                    }
                }
                Err(e) => {
                    error!("Queue fetch on {} failed: {}", queue, e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let job_id = job.id.clone();
            match self.run_job(job).await {
                Ok(()) => {
                    if let Err(e) = self.context.queue.complete(&job_id).await {
                        error!("Completing job {} failed: {}", job_id, e);
                    }
                }
                Err(e) => match self.context.queue.fail(&job_id, &e.to_string()).await {
                    Ok(updated) if updated.status == crate::queue::JobStatus::Dead => {
                        warn!(
                            "Job {} dead-lettered after {} attempts: {}",
                            job_id, updated.attempts_made, e
                        );
                    }
                    Ok(_) => debug!("Job {} re-queued after failure: {}", job_id, e),
                    Err(fail_err) => error!("Failing job {} failed: {}", job_id, fail_err),
                },
            }
        }
        debug!("Consumer {}/{} drained", queue, slot);
    }

    /// Dispatch one job to its agent.
    async fn run_job(&self, job: JobRecord) -> Result<()> {
        match job.name.as_str() {
            jobs::names::STOCK_CHANGED => {
                self.sync_agent
                    .handle_stock_changed(jobs::decode(&job)?)
                    .await
            }
            jobs::names::PUSH_UPDATE => {
                self.sync_agent.handle_push_update(jobs::decode(&job)?).await
            }
            jobs::names::FULL_SYNC => {
                self.sync_agent.handle_full_sync(jobs::decode(&job)?).await
            }
            jobs::names::INCREMENTAL_SYNC => {
                self.sync_agent
                    .handle_incremental_sync(jobs::decode(&job)?)
                    .await
            }
            jobs::names::DISPATCH_ALERT => {
                // Delivery is best-effort; the dispatcher never errors.
                self.dispatcher.dispatch(&jobs::decode(&job)?).await;
                Ok(())
            }
            other => {
                // Unknown job kinds are tolerated for forward compatibility.
                warn!("Unknown job kind '{}', completing without effect", other);
                Ok(())
            }
        }
    }

    async fn poll_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.cancel.cancelled() => break,
            }
            match self.poller.poll_once().await {
                Ok(0) => {}
                Ok(n) => debug!("Poll tick enqueued {} change(s)", n),
                Err(e) => warn!("Poll tick failed: {}", e),
            }
        }
    }

    async fn reconcile_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a freshly started
        // worker does not reconcile before its channels settle.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.cancel.cancelled() => break,
            }
            if let Err(e) = self.reconciler.run_pass(true).await {
                warn!("Reconciliation pass failed: {}", e);
            }
        }
    }

    async fn alert_loop(self: Arc<Self>) {
        let mut rx = self.context.bus.subscribe();
        loop {
            let event = tokio::select! {
                received = rx.recv() => received,
                _ = self.cancel.cancelled() => break,
            };
            match event {
                Ok(event) => {
                    if let Err(e) = self.alert_agent.observe(&event).await {
                        warn!("Alert evaluation failed: {}", e);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Alert agent lagged, {} event(s) dropped", missed);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn prune_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.cancel.cancelled() => break,
            }
            if let Err(e) = self.context.queue.prune(&self.context.tenant_id).await {
                warn!("Queue prune failed: {}", e);
            }
            if let Err(e) = self
                .alert_agent
                .garbage_collect(constants::JOB_FAILED_RETENTION_SECS)
                .await
            {
                warn!("Alert prune failed: {}", e);
            }
            if let Err(e) = self
                .context
                .sync_events
                .prune_older_than(&self.context.tenant_id, constants::JOB_FAILED_RETENTION_SECS)
                .await
            {
                warn!("Sync event prune failed: {}", e);
            }
        }
    }
}

/// Resident set size in megabytes, read from `/proc/self/statm` on Linux.
#[cfg(target_os = "linux")]
fn read_rss_mb() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let rss_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(rss_pages * 4096 / (1024 * 1024))
}

#[cfg(not(target_os = "linux"))]
fn read_rss_mb() -> Option<u64> {
    None
}
