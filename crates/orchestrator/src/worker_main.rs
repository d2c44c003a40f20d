//! Worker-process entry point.
//!
//! The orchestrator spawns `stockclerkd worker --tenant-id <id>`; this
//! module is that process's main loop. stdin carries [`ParentMessage`]s,
//! stdout carries [`WorkerMessage`]s, and all logging goes to stderr.
//!
//! Any error crossing the top of this loop is fatal to the process but
//! survivable to the system: an `error_report{fatal}` goes up, the process
//! exits nonzero, and the orchestrator restarts it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader, Stdout};
use tokio::sync::Mutex;

use stockclerk_core::errors::Result;
use stockclerk_core::settings::Settings;
use stockclerk_core::watcher::WebhookDelivery;
use stockclerk_core::worker::WorkerRuntime;

use crate::ipc::{self, ParentMessage, WorkerMessage};

/// Cadence of unsolicited health reports.
const HEALTH_REPORT_INTERVAL: Duration = Duration::from_secs(30);

type SharedStdout = Arc<Mutex<Stdout>>;

async fn send(stdout: &SharedStdout, message: &WorkerMessage) {
    let mut stdout = stdout.lock().await;
    if let Err(e) = ipc::write_message(&mut *stdout, message).await {
        // The parent is gone; nothing sensible left to do but exit soon.
        warn!("Write to parent failed: {}", e);
    }
}

/// Run the worker side of the IPC protocol.
///
/// `build` wires the storage layer into a [`WorkerRuntime`] once the `init`
/// message arrives; the daemon passes a closure that opens the database and
/// constructs the repositories.
pub async fn run_worker_process<B, F>(build: B) -> Result<()>
where
    B: FnOnce(String, Settings) -> F,
    F: Future<Output = Result<Arc<WorkerRuntime>>>,
{
    let stdin = tokio::io::stdin();
    let stdout: SharedStdout = Arc::new(Mutex::new(tokio::io::stdout()));
    let mut lines = BufReader::new(stdin).lines();

    // First message must be init.
    let (tenant_id, settings) = loop {
        let Some(line) = lines.next_line().await? else {
            return Err(stockclerk_core::Error::Unexpected(
                "stdin closed before init".to_string(),
            ));
        };
        match ipc::parse_line::<ParentMessage>(&line) {
            Some(ParentMessage::Init {
                tenant_id,
                settings,
            }) => break (tenant_id, settings),
            Some(other) => warn!("Ignoring pre-init message: {:?}", other),
            None => {}
        }
    };

    info!("Worker for tenant {} initializing", tenant_id);
    let runtime = match build(tenant_id.clone(), settings).await {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Worker bootstrap failed: {}", e);
            send(
                &stdout,
                &WorkerMessage::ErrorReport {
                    message: e.to_string(),
                    fatal: true,
                },
            )
            .await;
            return Err(e);
        }
    };
    runtime.start().await?;

    send(
        &stdout,
        &WorkerMessage::Ready {
            pid: std::process::id(),
        },
    )
    .await;

    // Relay bus events upward.
    {
        let stdout = stdout.clone();
        let mut rx = runtime.bus().subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                send(&stdout, &WorkerMessage::SyncEvent { event }).await;
            }
        });
    }

    // Unsolicited health reports between pings.
    {
        let stdout = stdout.clone();
        let runtime = runtime.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_REPORT_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let health = runtime.health();
                send(&stdout, &WorkerMessage::HealthReport { health }).await;
            }
        });
    }

    // Command loop.
    while let Some(line) = lines.next_line().await? {
        let Some(message) = ipc::parse_line::<ParentMessage>(&line) else {
            continue;
        };

        match message {
            ParentMessage::Ping { ts } => {
                send(&stdout, &WorkerMessage::Pong { ts }).await;
            }
            ParentMessage::Shutdown { graceful } => {
                runtime.shutdown(graceful).await;
                send(&stdout, &WorkerMessage::ShutdownComplete).await;
                return Ok(());
            }
            ParentMessage::TriggerSync { scope } => {
                if let Err(e) = runtime.trigger_sync(scope).await {
                    warn!("Trigger sync failed: {}", e);
                    send(
                        &stdout,
                        &WorkerMessage::ErrorReport {
                            message: e.to_string(),
                            fatal: false,
                        },
                    )
                    .await;
                }
            }
            ParentMessage::AddWebhookJob {
                channel_kind,
                external_instance_id,
                payload,
                signature,
            } => {
                let delivery = WebhookDelivery {
                    channel_kind,
                    body: payload.into_bytes(),
                    signature,
                    external_instance_id,
                };
                match runtime.handle_webhook(delivery).await {
                    Ok(outcome) => info!("Webhook intake: {:?}", outcome),
                    Err(e) => warn!("Webhook intake failed: {}", e),
                }
            }
            ParentMessage::TriggerReconciliation { auto_repair } => {
                let runtime = runtime.clone();
                let stdout = stdout.clone();
                tokio::spawn(async move {
                    match runtime.trigger_reconciliation(auto_repair).await {
                        Ok(report) => info!(
                            "Reconciliation: {} drift(s), {} repaired",
                            report.drifts_detected, report.drifts_repaired
                        ),
                        Err(e) => {
                            warn!("Reconciliation failed: {}", e);
                            send(
                                &stdout,
                                &WorkerMessage::ErrorReport {
                                    message: e.to_string(),
                                    fatal: false,
                                },
                            )
                            .await;
                        }
                    }
                });
            }
            ParentMessage::Init { .. } => warn!("Duplicate init ignored"),
            ParentMessage::Unknown => {}
        }
    }

    // stdin closed without a shutdown message: the parent died. Stop
    // cleanly rather than leak an orphan.
    info!("Parent connection closed, worker for {} exiting", tenant_id);
    runtime.shutdown(true).await;
    Ok(())
}
