//! Worker dependency wiring.
//!
//! Builds a [`WorkerRuntime`] from the SQLite storage layer. This is the
//! only place where the storage implementations meet the core traits.

use std::sync::Arc;

use stockclerk_channels::{Backoff, ChannelRegistry, RetryPolicy};
use stockclerk_core::channels::{ChannelService, ChannelServiceTrait};
use stockclerk_core::alerting::LoggingEmailSender;
use stockclerk_core::errors::Result;
use stockclerk_core::events::{EventBus, EventSink};
use stockclerk_core::secrets::SecretBox;
use stockclerk_core::settings::Settings;
use stockclerk_core::worker::{WorkerContext, WorkerRuntime};
use stockclerk_storage_sqlite::{
    db, AlertRepository, ChannelRepository, MappingRepository, ProductRepository, SqliteJobQueue,
    SyncEventRepository,
};

/// Per-worker pool size (spec'd default).
const WORKER_POOL_SIZE: u32 = 10;

/// Construct the full runtime for one tenant worker.
pub async fn build_worker_runtime(
    tenant_id: String,
    settings: Settings,
) -> Result<Arc<WorkerRuntime>> {
    let pool = db::init(&settings.database_url, WORKER_POOL_SIZE)?;
    let writer = db::spawn_writer(pool.clone());

    let products = Arc::new(ProductRepository::new(pool.clone(), writer.clone()));
    let channels = Arc::new(ChannelRepository::new(pool.clone(), writer.clone()));
    let mappings = Arc::new(MappingRepository::new(pool.clone(), writer.clone()));
    let sync_events = Arc::new(SyncEventRepository::new(pool.clone(), writer.clone()));
    let alerts = Arc::new(AlertRepository::new(pool.clone(), writer.clone()));
    let queue = Arc::new(SqliteJobQueue::new(pool.clone(), writer.clone()));

    let bus = EventBus::new();
    let registry = Arc::new(ChannelRegistry::with_policy(RetryPolicy {
        max_attempts: settings.sync_max_retries,
        rate_limit_attempts: 5,
        backoff: Backoff::default(),
    }));
    let secret_box = Arc::new(SecretBox::new(&settings.encryption_key)?);

    let channel_service: Arc<dyn ChannelServiceTrait> = Arc::new(ChannelService::new(
        channels.clone(),
        registry.clone(),
        secret_box.clone(),
        Arc::new(bus.clone()) as Arc<dyn EventSink>,
    ));

    let context = WorkerContext {
        tenant_id,
        settings,
        bus,
        queue,
        products,
        channels,
        channel_service,
        mappings,
        sync_events,
        alerts,
        registry,
        secret_box,
    };

    Ok(Arc::new(WorkerRuntime::new(
        context,
        Arc::new(LoggingEmailSender),
    )))
}
