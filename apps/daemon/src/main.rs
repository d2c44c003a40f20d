//! stockclerkd - the multi-tenant inventory sync daemon.
//!
//! Default mode runs the tenant orchestrator. The orchestrator respawns
//! this same binary with the internal `worker --tenant-id <id>` arguments
//! to host a single tenant's agents in an isolated process; operators never
//! invoke worker mode directly.

mod wiring;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stockclerk_core::settings::Settings;
use stockclerk_core::tenants::TenantRepositoryTrait;
use stockclerk_orchestrator::{
    run_worker_process, OrchestratorConfig, SupervisorConfig, TenantOrchestrator, WorkerCommand,
};
use stockclerk_storage_sqlite::{db, TenantRepository};

fn init_logging() {
    // Workers own stdout for IPC; logs always go to stderr in both modes
    // so output composes the same way everywhere.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    if args.get(1).map(String::as_str) == Some("worker") {
        let tenant_id = args
            .iter()
            .position(|a| a == "--tenant-id")
            .and_then(|i| args.get(i + 1))
            .cloned();
        // The tenant id also arrives in the init message; the argument is
        // for ps(1) legibility and sanity checking.
        runtime.block_on(run_worker(tenant_id))
    } else {
        runtime.block_on(run_orchestrator())
    }
}

async fn run_orchestrator() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("loading configuration")?;

    // The orchestrator's own pool is small: discovery reads only.
    let pool = db::init(&settings.database_url, 2).context("opening database")?;
    let tenants = Arc::new(TenantRepository::new(pool));

    let worker_binary = std::env::current_exe()
        .context("resolving worker binary path")?
        .to_string_lossy()
        .into_owned();

    let config = OrchestratorConfig {
        supervisor: SupervisorConfig {
            command: WorkerCommand {
                program: worker_binary,
                args: vec!["worker".to_string()],
                pass_tenant_arg: true,
            },
            max_heap_mb: settings.max_heap_mb,
            ..SupervisorConfig::default()
        },
        tenant_poll_interval: Duration::from_secs(60),
        health_check_interval: Duration::from_secs(30),
    };

    let discovery = {
        let tenants = tenants.clone();
        Arc::new(move || -> stockclerk_core::Result<Vec<String>> {
            Ok(tenants
                .list_active()?
                .into_iter()
                .map(|t| t.id)
                .collect())
        })
    };

    let orchestrator = Arc::new(TenantOrchestrator::new(settings, config, discovery));
    orchestrator.start().await.context("starting orchestrator")?;
    info!("Orchestrator up; press ctrl-c to stop");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    orchestrator.stop().await;
    info!("Orchestrator stopped");
    Ok(())
}

async fn run_worker(tenant_arg: Option<String>) -> anyhow::Result<()> {
    if let Some(ref tenant_id) = tenant_arg {
        info!("Worker process starting for tenant {}", tenant_id);
    }

    run_worker_process(|tenant_id, settings| async move {
        wiring::build_worker_runtime(tenant_id, settings).await
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))
}
