//! Per-tenant ambient state.
//!
//! Everything a tenant worker's agents need, injected explicitly at init.
//! There are no process-wide singletons other than logging; two contexts in
//! one test process are fully independent.

use std::sync::Arc;

use stockclerk_channels::ChannelRegistry;

use crate::alerts::AlertRepositoryTrait;
use crate::channels::{ChannelRepositoryTrait, ChannelServiceTrait};
use crate::events::EventBus;
use crate::mappings::MappingRepositoryTrait;
use crate::products::ProductRepositoryTrait;
use crate::queue::JobQueue;
use crate::secrets::SecretBox;
use crate::settings::Settings;
use crate::sync_events::SyncEventRepositoryTrait;

/// The dependency bundle for one tenant worker.
pub struct WorkerContext {
    pub tenant_id: String,
    pub settings: Settings,
    pub bus: EventBus,
    pub queue: Arc<dyn JobQueue>,
    pub products: Arc<dyn ProductRepositoryTrait>,
    pub channels: Arc<dyn ChannelRepositoryTrait>,
    pub channel_service: Arc<dyn ChannelServiceTrait>,
    pub mappings: Arc<dyn MappingRepositoryTrait>,
    pub sync_events: Arc<dyn SyncEventRepositoryTrait>,
    pub alerts: Arc<dyn AlertRepositoryTrait>,
    pub registry: Arc<ChannelRegistry>,
    pub secret_box: Arc<SecretBox>,
}
