//! Supervision tests against scripted shell workers.
//!
//! Real child processes, no real tenant runtime: each "worker" is a small
//! `sh` script that speaks just enough of the IPC protocol to drive the
//! state machine.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use stockclerk_core::settings::Settings;
use stockclerk_orchestrator::{
    OrchestratorConfig, SupervisionEvent, SupervisorConfig, TenantOrchestrator, WorkerCommand,
    WorkerHandle, WorkerState,
};

fn settings() -> Settings {
    Settings {
        database_url: ":memory:".to_string(),
        queue_url: None,
        sync_interval_ms: 30_000,
        sync_batch_size: 100,
        sync_max_retries: 3,
        reconciliation_interval_ms: 900_000,
        drift_auto_repair_threshold_pct: 5.0,
        low_stock_threshold: 10,
        encryption_key: "0123456789abcdef0123456789abcdef".to_string(),
        max_heap_mb: 256,
    }
}

fn config(script: &str) -> SupervisorConfig {
    SupervisorConfig {
        command: WorkerCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            pass_tenant_arg: true,
        },
        bootstrap_deadline: Duration::from_secs(5),
        restart_backoff: Duration::from_millis(50),
        restart_backoff_cap: Duration::from_secs(1),
        max_restarts: 10,
        health_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_millis(500),
        max_heap_mb: 256,
    }
}

/// A worker that handshakes and then idles.
const HEALTHY: &str = r#"echo "{\"type\":\"ready\",\"pid\":$$}"; sleep 60"#;

/// A worker that handshakes, then answers pings and exits on shutdown.
const POLITE: &str = r#"
echo "{\"type\":\"ready\",\"pid\":$$}"
while read line; do
  case "$line" in
    *shutdown*) echo "{\"type\":\"shutdown_complete\"}"; exit 0;;
    *ping*) echo "{\"type\":\"pong\",\"ts\":0}";;
  esac
done
"#;

/// A worker that dies immediately, never reaching ready.
const DOOMED: &str = "exit 7";

async fn wait_for_event<F>(
    rx: &mut mpsc::Receiver<SupervisionEvent>,
    timeout: Duration,
    mut predicate: F,
) -> SupervisionEvent
where
    F: FnMut(&SupervisionEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let event = tokio::time::timeout(remaining, rx.recv())
            .await
            .expect("timed out waiting for supervision event")
            .expect("event channel closed");
        if predicate(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_worker_reaches_running_after_ready() {
    let (tx, mut rx) = mpsc::channel(64);
    let handle = WorkerHandle::spawn("t1".to_string(), settings(), config(HEALTHY), tx);

    let event = wait_for_event(&mut rx, Duration::from_secs(5), |e| {
        matches!(e, SupervisionEvent::Ready { .. })
    })
    .await;
    match event {
        SupervisionEvent::Ready { tenant_id, pid } => {
            assert_eq!(tenant_id, "t1");
            assert!(pid > 0);
        }
        other => panic!("Unexpected event: {:?}", other),
    }
    assert_eq!(handle.state(), WorkerState::Running);

    handle.stop(false).await;
    handle.join().await;
}

#[tokio::test]
async fn test_crash_restart_resets_consecutive_failures() {
    // Crash once (flag file absent), then come up healthy.
    let dir = tempfile::tempdir().unwrap();
    let flag = dir.path().join("crashed-once");
    let script = format!(
        r#"if [ -f {flag} ]; then echo "{{\"type\":\"ready\",\"pid\":$$}}"; sleep 60; else touch {flag}; exit 1; fi"#,
        flag = flag.display()
    );

    let (tx, mut rx) = mpsc::channel(64);
    let handle = WorkerHandle::spawn("t1".to_string(), settings(), config(&script), tx);

    wait_for_event(&mut rx, Duration::from_secs(5), |e| {
        matches!(e, SupervisionEvent::Crashed { .. })
    })
    .await;
    wait_for_event(&mut rx, Duration::from_secs(5), |e| {
        matches!(e, SupervisionEvent::Ready { .. })
    })
    .await;

    let info = handle.info.lock().unwrap();
    assert_eq!(info.state, WorkerState::Running);
    assert_eq!(info.restarts, 1);
    // Ready resets the consecutive counter; the cumulative count stays.
    assert_eq!(info.consecutive_failures, 0);
    drop(info);

    handle.stop(false).await;
    handle.join().await;
}

#[tokio::test]
async fn test_restart_cap_goes_terminal() {
    let mut cfg = config(DOOMED);
    cfg.max_restarts = 3;

    let (tx, mut rx) = mpsc::channel(64);
    let handle = WorkerHandle::spawn("t1".to_string(), settings(), cfg, tx);

    wait_for_event(&mut rx, Duration::from_secs(10), |e| {
        matches!(e, SupervisionEvent::MaxRestarts { .. })
    })
    .await;

    handle.join().await;
}

#[tokio::test]
async fn test_graceful_stop_emits_stopped() {
    let (tx, mut rx) = mpsc::channel(64);
    let handle = WorkerHandle::spawn("t1".to_string(), settings(), config(POLITE), tx);

    wait_for_event(&mut rx, Duration::from_secs(5), |e| {
        matches!(e, SupervisionEvent::Ready { .. })
    })
    .await;

    handle.stop(true).await;
    wait_for_event(&mut rx, Duration::from_secs(5), |e| {
        matches!(e, SupervisionEvent::Stopped { .. })
    })
    .await;
}

/// Crash isolation: tenant A's worker dies, tenant B's worker is untouched.
#[tokio::test]
async fn test_crash_isolation_between_tenants() {
    // t1 crashes once after ready; t2 stays healthy. The tenant id arrives
    // as $1 via the --tenant-id argument.
    let dir = tempfile::tempdir().unwrap();
    let flag = dir.path().join("t1-crashed");
    let script = format!(
        r#"
if [ "$1" = "t1" ] && [ ! -f {flag} ]; then
  echo "{{\"type\":\"ready\",\"pid\":$$}}"
  touch {flag}
  exit 139
fi
echo "{{\"type\":\"ready\",\"pid\":$$}}"
sleep 60
"#,
        flag = flag.display()
    );

    let mut cfg = OrchestratorConfig::default();
    cfg.supervisor = config(&script);
    cfg.tenant_poll_interval = Duration::from_secs(3600);
    cfg.health_check_interval = Duration::from_secs(3600);

    let discovery = Arc::new(|| -> stockclerk_core::Result<Vec<String>> {
        Ok(vec!["t1".to_string(), "t2".to_string()])
    });
    let orchestrator = Arc::new(TenantOrchestrator::new(settings(), cfg, discovery));
    let mut events = orchestrator.subscribe();
    orchestrator.start().await.unwrap();

    // Both come up; t1 then crashes and comes back.
    let mut t1_ready = 0;
    let mut t2_ready = 0;
    let mut t1_crashed = 0;
    let mut t2_crashed = 0;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while t1_ready < 2 || t2_ready < 1 {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let event = tokio::time::timeout(remaining, events.recv())
            .await
            .expect("timed out waiting for isolation events")
            .expect("event stream closed");
        match event {
            SupervisionEvent::Ready { ref tenant_id, .. } if tenant_id == "t1" => t1_ready += 1,
            SupervisionEvent::Ready { ref tenant_id, .. } if tenant_id == "t2" => t2_ready += 1,
            SupervisionEvent::Crashed { ref tenant_id, .. } if tenant_id == "t1" => {
                t1_crashed += 1
            }
            SupervisionEvent::Crashed { ref tenant_id, .. } if tenant_id == "t2" => {
                t2_crashed += 1
            }
            _ => {}
        }
    }

    assert_eq!(t1_crashed, 1, "t1 crashed exactly once");
    assert_eq!(t2_crashed, 0, "t2 must be unaffected by t1's crash");
    assert_eq!(t1_ready, 2, "t1 was respawned after the crash");

    let status = orchestrator.status();
    let t2 = status
        .tenants
        .iter()
        .find(|t| t.tenant_id == "t2")
        .expect("t2 tracked");
    assert_eq!(t2.state, WorkerState::Running);
    assert_eq!(t2.restarts, 0);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_discovery_stops_extraneous_workers() {
    let tenants = Arc::new(std::sync::Mutex::new(vec!["t1".to_string()]));
    let discovery = {
        let tenants = tenants.clone();
        Arc::new(move || -> stockclerk_core::Result<Vec<String>> {
            Ok(tenants.lock().unwrap().clone())
        })
    };

    let mut cfg = OrchestratorConfig::default();
    cfg.supervisor = config(POLITE);
    cfg.tenant_poll_interval = Duration::from_secs(3600);
    cfg.health_check_interval = Duration::from_secs(3600);

    let orchestrator = Arc::new(TenantOrchestrator::new(settings(), cfg, discovery));
    orchestrator.start().await.unwrap();
    assert_eq!(orchestrator.status().tenants.len(), 1);

    // Tenant deactivates; the next reconcile pass stops its worker.
    tenants.lock().unwrap().clear();
    orchestrator.reconcile_workers().await.unwrap();
    assert!(orchestrator.status().tenants.is_empty());

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_subscribe_sees_relayed_events() {
    // Sanity-check the broadcast plumbing without any worker events.
    let mut cfg = OrchestratorConfig::default();
    cfg.supervisor = config(HEALTHY);
    cfg.tenant_poll_interval = Duration::from_secs(3600);
    cfg.health_check_interval = Duration::from_secs(3600);

    let discovery = Arc::new(|| -> stockclerk_core::Result<Vec<String>> {
        Ok(vec!["t1".to_string()])
    });
    let orchestrator = Arc::new(TenantOrchestrator::new(settings(), cfg, discovery));
    let mut rx: broadcast::Receiver<SupervisionEvent> = orchestrator.subscribe();
    orchestrator.start().await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out")
        .expect("stream closed");
    assert!(matches!(event, SupervisionEvent::Ready { .. }));

    orchestrator.stop().await;
}
