//! Per-tenant worker supervision.
//!
//! Each tenant gets one supervision task owning the OS process lifecycle:
//!
//! ```text
//! spawning -> running -> stopping -> stopped
//!         \-> crashed -> restarting -> spawning
//! ```
//!
//! The task respawns crashed workers with exponential backoff until the
//! restart cap, after which the tenant is marked terminal and left for an
//! operator.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use stockclerk_core::settings::Settings;
use stockclerk_core::worker::WorkerHealth;

use crate::ipc::{self, ParentMessage, WorkerMessage};

/// Supervision state of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Spawning,
    Running,
    Stopping,
    Stopped,
    Crashed,
    Restarting,
    /// Restart cap reached; no further automatic respawn.
    Terminal,
}

/// Orchestrator-level lifecycle notifications.
#[derive(Debug, Clone)]
pub enum SupervisionEvent {
    /// `tenant:ready` - the worker completed its bootstrap handshake.
    Ready { tenant_id: String, pid: u32 },
    /// `tenant:crashed` - unexpected exit or ping timeout.
    Crashed { tenant_id: String, reason: String },
    /// `tenant:max_restarts` - the tenant went terminal.
    MaxRestarts { tenant_id: String },
    /// Clean stop.
    Stopped { tenant_id: String },
    /// A bus event relayed from the worker.
    WorkerEvent {
        tenant_id: String,
        event: stockclerk_core::events::StockEvent,
    },
}

/// How workers are launched. The daemon points this at its own binary with
/// the internal `worker` argument; tests point it at scripts.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Append `--tenant-id <id>` to the argument list.
    pub pass_tenant_arg: bool,
}

/// Supervision policy knobs.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub command: WorkerCommand,
    /// Deadline for the `ready` handshake after spawn.
    pub bootstrap_deadline: Duration,
    /// Base of the restart backoff: `restart_backoff * 2^(failures-1)`.
    pub restart_backoff: Duration,
    /// Cap on any single restart delay.
    pub restart_backoff_cap: Duration,
    /// Cumulative restarts before the tenant goes terminal.
    pub max_restarts: u32,
    /// A worker silent for twice this long is considered hung.
    pub health_timeout: Duration,
    /// Grace budget for a graceful shutdown before SIGKILL.
    pub shutdown_grace: Duration,
    /// Workers reporting RSS above this are force-restarted.
    pub max_heap_mb: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            command: WorkerCommand {
                program: "stockclerkd".to_string(),
                args: vec!["worker".to_string()],
                pass_tenant_arg: true,
            },
            bootstrap_deadline: Duration::from_secs(15),
            restart_backoff: Duration::from_secs(5),
            restart_backoff_cap: Duration::from_secs(300),
            max_restarts: 10,
            health_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
            max_heap_mb: 256,
        }
    }
}

/// Shared, observable state of one supervised worker.
#[derive(Debug)]
pub struct WorkerInfo {
    pub state: WorkerState,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub consecutive_failures: u32,
    pub last_pong: Option<Instant>,
    pub last_health: Option<WorkerHealth>,
    pub last_error: Option<String>,
}

impl WorkerInfo {
    fn new() -> Self {
        Self {
            state: WorkerState::Spawning,
            pid: None,
            restarts: 0,
            consecutive_failures: 0,
            last_pong: None,
            last_health: None,
            last_error: None,
        }
    }
}

pub(crate) enum Control {
    Stop { graceful: bool },
    Kill { reason: String },
}

/// Handle to one tenant's supervision task.
pub struct WorkerHandle {
    pub tenant_id: String,
    pub info: Arc<Mutex<WorkerInfo>>,
    outbox: mpsc::Sender<ParentMessage>,
    control: mpsc::Sender<Control>,
    task: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawn the supervision task for a tenant.
    pub fn spawn(
        tenant_id: String,
        settings: Settings,
        config: SupervisorConfig,
        events: mpsc::Sender<SupervisionEvent>,
    ) -> Self {
        let info = Arc::new(Mutex::new(WorkerInfo::new()));
        let (outbox_tx, outbox_rx) = mpsc::channel(64);
        let (control_tx, control_rx) = mpsc::channel(8);

        let task = tokio::spawn(supervise(
            tenant_id.clone(),
            settings,
            config,
            info.clone(),
            outbox_rx,
            control_rx,
            events,
        ));

        Self {
            tenant_id,
            info,
            outbox: outbox_tx,
            control: control_tx,
            task,
        }
    }

    /// Send a message to the worker. Failures (worker mid-restart) are
    /// logged and dropped; the next tick re-observes the state.
    pub async fn send(&self, message: ParentMessage) {
        if self.outbox.send(message).await.is_err() {
            warn!(
                "Message to tenant {} dropped, supervision task gone",
                self.tenant_id
            );
        }
    }

    /// Request a stop. The supervision task exits once the worker is down.
    pub async fn stop(&self, graceful: bool) {
        let _ = self.control.send(Control::Stop { graceful }).await;
    }

    /// Force a restart cycle (used on hung pings and heap overruns).
    pub async fn kill(&self, reason: String) {
        let _ = self.control.send(Control::Kill { reason }).await;
    }

    pub fn state(&self) -> WorkerState {
        self.info.lock().unwrap().state
    }

    /// Clone of the message channel, for sending outside the registry lock.
    pub fn outbox(&self) -> mpsc::Sender<ParentMessage> {
        self.outbox.clone()
    }

    /// Clone of the control channel, for killing outside the registry lock.
    pub(crate) fn control(&self) -> mpsc::Sender<Control> {
        self.control.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) {
        let _ = self.task.await;
    }
}

fn set_state(info: &Arc<Mutex<WorkerInfo>>, state: WorkerState) {
    info.lock().unwrap().state = state;
}

/// Restart delay for the n-th consecutive failure (1-based), capped.
fn restart_delay(config: &SupervisorConfig, consecutive_failures: u32) -> Duration {
    let shift = consecutive_failures.saturating_sub(1).min(31);
    config
        .restart_backoff
        .saturating_mul(1u32 << shift)
        .min(config.restart_backoff_cap)
}

/// The supervision loop: spawn, monitor, restart until stopped or terminal.
#[allow(clippy::too_many_arguments)]
async fn supervise(
    tenant_id: String,
    settings: Settings,
    config: SupervisorConfig,
    info: Arc<Mutex<WorkerInfo>>,
    mut outbox: mpsc::Receiver<ParentMessage>,
    mut control: mpsc::Receiver<Control>,
    events: mpsc::Sender<SupervisionEvent>,
) {
    loop {
        set_state(&info, WorkerState::Spawning);

        let mut child = match spawn_worker(&tenant_id, &config) {
            Ok(child) => child,
            Err(e) => {
                error!("Spawning worker for {} failed: {}", tenant_id, e);
                match note_crash(&tenant_id, &info, &config, &events, e.to_string()).await {
                    None => return,
                    Some(delay) => {
                        set_state(&info, WorkerState::Restarting);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                }
            }
        };

        let pid = child.id();
        info.lock().unwrap().pid = pid;

        let outcome = run_worker(
            &tenant_id,
            &settings,
            &config,
            &info,
            &mut child,
            &mut outbox,
            &mut control,
            &events,
        )
        .await;

        match outcome {
            RunOutcome::Stopped => {
                set_state(&info, WorkerState::Stopped);
                let _ = events
                    .send(SupervisionEvent::Stopped {
                        tenant_id: tenant_id.clone(),
                    })
                    .await;
                return;
            }
            RunOutcome::Crashed(reason) => {
                let Some(delay) = note_crash(&tenant_id, &info, &config, &events, reason).await
                else {
                    return;
                };

                set_state(&info, WorkerState::Restarting);
                // A stop request during backoff wins over the respawn.
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    command = control.recv() => {
                        if matches!(command, Some(Control::Stop { .. }) | None) {
                            set_state(&info, WorkerState::Stopped);
                            let _ = events
                                .send(SupervisionEvent::Stopped {
                                    tenant_id: tenant_id.clone(),
                                })
                                .await;
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Record a crash; returns the backoff delay before respawn, or `None`
/// when the tenant went terminal.
async fn note_crash(
    tenant_id: &str,
    info: &Arc<Mutex<WorkerInfo>>,
    config: &SupervisorConfig,
    events: &mpsc::Sender<SupervisionEvent>,
    reason: String,
) -> Option<Duration> {
    let (restarts, consecutive) = {
        let mut guard = info.lock().unwrap();
        guard.state = WorkerState::Crashed;
        guard.pid = None;
        guard.restarts += 1;
        guard.consecutive_failures += 1;
        guard.last_error = Some(reason.clone());
        (guard.restarts, guard.consecutive_failures)
    };

    warn!(
        "Worker for {} crashed ({}); restart {}/{}",
        tenant_id, reason, restarts, config.max_restarts
    );
    let _ = events
        .send(SupervisionEvent::Crashed {
            tenant_id: tenant_id.to_string(),
            reason,
        })
        .await;

    if restarts >= config.max_restarts {
        set_state(info, WorkerState::Terminal);
        error!("Tenant {} reached the restart cap, going terminal", tenant_id);
        let _ = events
            .send(SupervisionEvent::MaxRestarts {
                tenant_id: tenant_id.to_string(),
            })
            .await;
        return None;
    }

    Some(restart_delay(config, consecutive))
}

fn spawn_worker(tenant_id: &str, config: &SupervisorConfig) -> std::io::Result<Child> {
    let mut command = Command::new(&config.command.program);
    command.args(&config.command.args);
    if config.command.pass_tenant_arg {
        command.args(["--tenant-id", tenant_id]);
    }
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        // Worker logs go to stderr and pass straight through.
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
}

enum RunOutcome {
    Stopped,
    Crashed(String),
}

/// Drive one child process from handshake to exit.
#[allow(clippy::too_many_arguments)]
async fn run_worker(
    tenant_id: &str,
    settings: &Settings,
    config: &SupervisorConfig,
    info: &Arc<Mutex<WorkerInfo>>,
    child: &mut Child,
    outbox: &mut mpsc::Receiver<ParentMessage>,
    control: &mut mpsc::Receiver<Control>,
    events: &mpsc::Sender<SupervisionEvent>,
) -> RunOutcome {
    let mut stdin = match child.stdin.take() {
        Some(stdin) => stdin,
        None => return RunOutcome::Crashed("worker stdin unavailable".to_string()),
    };
    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => return RunOutcome::Crashed("worker stdout unavailable".to_string()),
    };
    let mut lines = BufReader::new(stdout).lines();

    // Handshake: init goes down, ready must come back within the deadline.
    let init = ParentMessage::Init {
        tenant_id: tenant_id.to_string(),
        settings: settings.clone(),
    };
    if let Err(e) = ipc::write_message(&mut stdin, &init).await {
        return RunOutcome::Crashed(format!("init write failed: {}", e));
    }

    let handshake = tokio::time::timeout(config.bootstrap_deadline, async {
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(WorkerMessage::Ready { pid }) = ipc::parse_line(&line) {
                return Some(pid);
            }
        }
        None
    })
    .await;

    let pid = match handshake {
        Ok(Some(pid)) => pid,
        Ok(None) => {
            let _ = child.kill().await;
            return RunOutcome::Crashed("worker exited before ready".to_string());
        }
        Err(_) => {
            let _ = child.kill().await;
            return RunOutcome::Crashed("bootstrap deadline exceeded".to_string());
        }
    };

    {
        let mut guard = info.lock().unwrap();
        guard.state = WorkerState::Running;
        guard.consecutive_failures = 0;
        guard.last_pong = Some(Instant::now());
    }
    info!("Worker for {} ready (pid {})", tenant_id, pid);
    let _ = events
        .send(SupervisionEvent::Ready {
            tenant_id: tenant_id.to_string(),
            pid,
        })
        .await;

    let mut stopping = false;
    loop {
        tokio::select! {
            exit = child.wait() => {
                let status = exit
                    .map(|s| s.to_string())
                    .unwrap_or_else(|e| e.to_string());
                return if stopping {
                    RunOutcome::Stopped
                } else {
                    RunOutcome::Crashed(format!("unexpected exit: {}", status))
                };
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        handle_worker_message(tenant_id, info, events, &line).await;
                    }
                    // stdout closed: the exit branch will resolve next.
                    Ok(None) => tokio::time::sleep(Duration::from_millis(10)).await,
                    Err(e) => debug!("stdout read error for {}: {}", tenant_id, e),
                }
            }

            message = outbox.recv() => {
                if let Some(message) = message {
                    if let Err(e) = ipc::write_message(&mut stdin, &message).await {
                        // Send failures to a dying child are dropped; the
                        // exit branch observes the crash.
                        warn!("Send to worker {} failed: {}", tenant_id, e);
                    }
                }
            }

            command = control.recv() => {
                match command {
                    Some(Control::Stop { graceful }) => {
                        stopping = true;
                        set_state(info, WorkerState::Stopping);
                        let _ = ipc::write_message(
                            &mut stdin,
                            &ParentMessage::Shutdown { graceful },
                        ).await;

                        let deadline = tokio::time::timeout(config.shutdown_grace, child.wait()).await;
                        if deadline.is_err() {
                            warn!("Worker for {} exceeded shutdown grace, killing", tenant_id);
                            let _ = child.kill().await;
                            let _ = child.wait().await;
                        }
                        return RunOutcome::Stopped;
                    }
                    Some(Control::Kill { reason }) => {
                        warn!("Force-killing worker for {}: {}", tenant_id, reason);
                        let _ = child.kill().await;
                        let _ = child.wait().await;
                        return RunOutcome::Crashed(reason);
                    }
                    None => {
                        // Handle dropped: orchestrator is going away.
                        let _ = child.kill().await;
                        return RunOutcome::Stopped;
                    }
                }
            }
        }
    }
}

async fn handle_worker_message(
    tenant_id: &str,
    info: &Arc<Mutex<WorkerInfo>>,
    events: &mpsc::Sender<SupervisionEvent>,
    line: &str,
) {
    let Some(message) = ipc::parse_line::<WorkerMessage>(line) else {
        debug!("Unparseable line from worker {}: {}", tenant_id, line);
        return;
    };

    match message {
        WorkerMessage::Pong { .. } => {
            info.lock().unwrap().last_pong = Some(Instant::now());
        }
        WorkerMessage::HealthReport { health } => {
            let mut guard = info.lock().unwrap();
            guard.last_pong = Some(Instant::now());
            guard.last_health = Some(health);
        }
        WorkerMessage::ErrorReport { message, fatal } => {
            warn!(
                "Worker {} reported error (fatal: {}): {}",
                tenant_id, fatal, message
            );
            info.lock().unwrap().last_error = Some(message);
        }
        WorkerMessage::SyncEvent { event } => {
            let _ = events
                .send(SupervisionEvent::WorkerEvent {
                    tenant_id: tenant_id.to_string(),
                    event,
                })
                .await;
        }
        WorkerMessage::Ready { .. } | WorkerMessage::ShutdownComplete => {}
        WorkerMessage::Unknown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_delay_doubles_and_caps() {
        let config = SupervisorConfig::default();
        assert_eq!(restart_delay(&config, 1), Duration::from_secs(5));
        assert_eq!(restart_delay(&config, 2), Duration::from_secs(10));
        assert_eq!(restart_delay(&config, 3), Duration::from_secs(20));
        // 5 * 2^9 = 2560s, capped at 300.
        assert_eq!(restart_delay(&config, 10), Duration::from_secs(300));
    }
}
