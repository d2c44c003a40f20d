mod sync_events_model;
mod sync_events_traits;

pub use sync_events_model::{NewSyncEvent, SyncEventRecord, SyncEventStatus};
pub use sync_events_traits::SyncEventRepositoryTrait;
