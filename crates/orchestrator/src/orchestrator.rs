//! The tenant orchestrator.
//!
//! Keeps exactly one healthy worker process alive per active tenant,
//! isolates faults between tenants, routes operator commands to the right
//! worker, and aggregates health.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use stockclerk_core::errors::Result;
use stockclerk_core::settings::Settings;
use stockclerk_core::worker::{SyncScope, WorkerHealth};
use stockclerk_core::ChannelKind;

use crate::ipc::ParentMessage;
use crate::supervisor::{
    SupervisionEvent, SupervisorConfig, WorkerHandle, WorkerState,
};

/// How the orchestrator learns which tenants should be running.
pub trait TenantDiscovery: Send + Sync {
    fn active_tenant_ids(&self) -> Result<Vec<String>>;
}

impl<F> TenantDiscovery for F
where
    F: Fn() -> Result<Vec<String>> + Send + Sync,
{
    fn active_tenant_ids(&self) -> Result<Vec<String>> {
        self()
    }
}

/// Orchestrator policy knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub supervisor: SupervisorConfig,
    /// Cadence of the discovery reconciliation loop.
    pub tenant_poll_interval: Duration,
    /// Cadence of the health ping loop.
    pub health_check_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorConfig::default(),
            tenant_poll_interval: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(30),
        }
    }
}

/// Externally visible status of one tenant's worker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatus {
    pub tenant_id: String,
    pub state: WorkerState,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub last_error: Option<String>,
}

/// Aggregated orchestrator status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorStatus {
    pub tenants: Vec<TenantStatus>,
    pub running: usize,
    pub terminal: usize,
}

pub struct TenantOrchestrator {
    settings: Settings,
    config: OrchestratorConfig,
    discovery: Arc<dyn TenantDiscovery>,
    workers: Mutex<HashMap<String, WorkerHandle>>,
    /// Lifecycle notifications, re-broadcast for observers (and tests).
    events_tx: broadcast::Sender<SupervisionEvent>,
    supervision_tx: mpsc::Sender<SupervisionEvent>,
    supervision_rx: Mutex<Option<mpsc::Receiver<SupervisionEvent>>>,
    cancel: CancellationToken,
}

impl TenantOrchestrator {
    pub fn new(
        settings: Settings,
        config: OrchestratorConfig,
        discovery: Arc<dyn TenantDiscovery>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        let (supervision_tx, supervision_rx) = mpsc::channel(256);
        Self {
            settings,
            config,
            discovery,
            workers: Mutex::new(HashMap::new()),
            events_tx,
            supervision_tx,
            supervision_rx: Mutex::new(Some(supervision_rx)),
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to lifecycle events (`tenant:ready`, `tenant:crashed`,
    /// `tenant:max_restarts`, relayed worker events).
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisionEvent> {
        self.events_tx.subscribe()
    }

    /// Begin: reconcile once immediately, then run the discovery and
    /// health loops until [`stop`](Self::stop).
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.reconcile_workers().await?;

        // Event pump: re-broadcast supervision events.
        {
            let orchestrator = self.clone();
            let mut rx = self
                .supervision_rx
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| unreachable!("start called twice"));
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        event = rx.recv() => match event {
                            Some(event) => { let _ = orchestrator.events_tx.send(event); }
                            None => break,
                        },
                        _ = orchestrator.cancel.cancelled() => break,
                    }
                }
            });
        }

        // Discovery loop.
        {
            let orchestrator = self.clone();
            let interval = self.config.tenant_poll_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = orchestrator.cancel.cancelled() => break,
                    }
                    if let Err(e) = orchestrator.reconcile_workers().await {
                        warn!("Tenant discovery failed: {}", e);
                    }
                }
            });
        }

        // Health loop.
        {
            let orchestrator = self.clone();
            let interval = self.config.health_check_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = orchestrator.cancel.cancelled() => break,
                    }
                    orchestrator.health_pass().await;
                }
            });
        }

        Ok(())
    }

    /// Graceful shutdown of all workers, bounded per worker by the
    /// supervisor's grace budget.
    pub async fn stop(&self) {
        info!("Orchestrator stopping");
        self.cancel.cancel();

        let workers: Vec<WorkerHandle> = {
            let mut guard = self.workers.lock().unwrap();
            guard.drain().map(|(_, handle)| handle).collect()
        };

        for worker in &workers {
            worker.stop(true).await;
        }
        for worker in workers {
            worker.join().await;
        }
    }

    /// Reconcile the live worker set with the discovered tenant set:
    /// spawn missing, stop extraneous.
    pub async fn reconcile_workers(&self) -> Result<usize> {
        let wanted = self.discovery.active_tenant_ids()?;

        let (to_stop, to_start) = {
            let workers = self.workers.lock().unwrap();
            let to_stop: Vec<String> = workers
                .keys()
                .filter(|id| !wanted.contains(id))
                .cloned()
                .collect();
            let to_start: Vec<String> = wanted
                .iter()
                .filter(|id| !workers.contains_key(*id))
                .cloned()
                .collect();
            (to_stop, to_start)
        };

        for tenant_id in to_stop {
            info!("Tenant {} no longer active, stopping its worker", tenant_id);
            let handle = self.workers.lock().unwrap().remove(&tenant_id);
            if let Some(handle) = handle {
                handle.stop(true).await;
                handle.join().await;
            }
        }

        let started = to_start.len();
        for tenant_id in to_start {
            info!("Spawning worker for tenant {}", tenant_id);
            let handle = WorkerHandle::spawn(
                tenant_id.clone(),
                self.settings.clone(),
                self.config.supervisor.clone(),
                self.supervision_tx.clone(),
            );
            self.workers.lock().unwrap().insert(tenant_id, handle);
        }

        // Reap terminal supervision tasks so a re-activated tenant can be
        // respawned by a later pass.
        self.workers
            .lock()
            .unwrap()
            .retain(|_, handle| !(handle.is_finished() && handle.state() == WorkerState::Terminal));

        Ok(started)
    }

    /// Ping every running worker; kill the ones that have gone silent or
    /// overrun their heap budget.
    async fn health_pass(&self) {
        let now = chrono::Utc::now().timestamp_millis();
        let handles: Vec<(String, Arc<Mutex<crate::supervisor::WorkerInfo>>)> = {
            let workers = self.workers.lock().unwrap();
            workers
                .values()
                .map(|h| (h.tenant_id.clone(), h.info.clone()))
                .collect()
        };

        for (tenant_id, info) in handles {
            let (state, stale, over_heap) = {
                let guard = info.lock().unwrap();
                let stale = guard
                    .last_pong
                    .map(|at| at.elapsed() > self.config.supervisor.health_timeout * 2)
                    .unwrap_or(false);
                let over_heap = guard
                    .last_health
                    .as_ref()
                    .and_then(|h| h.rss_mb)
                    .map(|rss| rss > self.config.supervisor.max_heap_mb)
                    .unwrap_or(false);
                (guard.state, stale, over_heap)
            };

            if state != WorkerState::Running {
                continue;
            }

            if stale {
                self.kill_worker(&tenant_id, "ping timeout").await;
                continue;
            }
            if over_heap {
                self.kill_worker(&tenant_id, "heap budget exceeded").await;
                continue;
            }

            self.send_to(&tenant_id, ParentMessage::Ping { ts: now }).await;
        }
    }

    async fn kill_worker(&self, tenant_id: &str, reason: &str) {
        let control = {
            let workers = self.workers.lock().unwrap();
            workers.get(tenant_id).map(|h| h.control())
        };
        if let Some(control) = control {
            let _ = control
                .send(crate::supervisor::Control::Kill {
                    reason: reason.to_string(),
                })
                .await;
        }
    }

    /// Route a sync trigger to a tenant's worker.
    pub async fn trigger_sync(&self, tenant_id: &str, scope: SyncScope) {
        self.send_to(tenant_id, ParentMessage::TriggerSync { scope })
            .await;
    }

    /// Route a webhook to a tenant's worker queue.
    pub async fn enqueue_webhook(
        &self,
        tenant_id: &str,
        channel_kind: ChannelKind,
        external_instance_id: String,
        payload: String,
        signature: Option<String>,
    ) {
        self.send_to(
            tenant_id,
            ParentMessage::AddWebhookJob {
                channel_kind,
                external_instance_id,
                payload,
                signature,
            },
        )
        .await;
    }

    /// Route a reconciliation trigger to a tenant's worker.
    pub async fn trigger_reconciliation(&self, tenant_id: &str, auto_repair: bool) {
        self.send_to(
            tenant_id,
            ParentMessage::TriggerReconciliation { auto_repair },
        )
        .await;
    }

    async fn send_to(&self, tenant_id: &str, message: ParentMessage) {
        let outbox = {
            let workers = self.workers.lock().unwrap();
            workers.get(tenant_id).map(|h| h.outbox())
        };
        match outbox {
            Some(outbox) => {
                if outbox.send(message).await.is_err() {
                    warn!("Message to tenant {} dropped, worker gone", tenant_id);
                }
            }
            None => warn!("No worker for tenant {}, message dropped", tenant_id),
        }
    }

    /// Aggregate status over all workers.
    pub fn status(&self) -> OrchestratorStatus {
        let workers = self.workers.lock().unwrap();
        let tenants: Vec<TenantStatus> = workers
            .values()
            .map(|handle| {
                let info = handle.info.lock().unwrap();
                TenantStatus {
                    tenant_id: handle.tenant_id.clone(),
                    state: info.state,
                    pid: info.pid,
                    restarts: info.restarts,
                    last_error: info.last_error.clone(),
                }
            })
            .collect();

        let running = tenants
            .iter()
            .filter(|t| t.state == WorkerState::Running)
            .count();
        let terminal = tenants
            .iter()
            .filter(|t| t.state == WorkerState::Terminal)
            .count();
        OrchestratorStatus {
            tenants,
            running,
            terminal,
        }
    }

    /// Status of one tenant's worker.
    pub fn tenant_status(&self, tenant_id: &str) -> Option<TenantStatus> {
        self.status()
            .tenants
            .into_iter()
            .find(|t| t.tenant_id == tenant_id)
    }

    /// Last health report of one tenant's worker.
    pub fn tenant_health(&self, tenant_id: &str) -> Option<WorkerHealth> {
        let workers = self.workers.lock().unwrap();
        workers
            .get(tenant_id)
            .and_then(|h| h.info.lock().unwrap().last_health.clone())
    }
}
