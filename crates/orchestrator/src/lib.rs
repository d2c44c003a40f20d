//! Stockclerk Orchestrator - multi-tenant worker lifecycle.
//!
//! The orchestrator discovers active tenants, spawns one isolated worker
//! process per tenant, supervises and restarts them, routes operator
//! commands over a small typed IPC protocol, and aggregates health. A crash
//! in one tenant's worker never affects another tenant.

pub mod ipc;
pub mod orchestrator;
pub mod supervisor;
pub mod worker_main;

pub use ipc::{ParentMessage, WorkerMessage};
pub use orchestrator::{
    OrchestratorConfig, OrchestratorStatus, TenantDiscovery, TenantOrchestrator, TenantStatus,
};
pub use supervisor::{
    SupervisionEvent, SupervisorConfig, WorkerCommand, WorkerHandle, WorkerState,
};
pub use worker_main::run_worker_process;
