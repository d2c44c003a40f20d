//! The sync agent and its job payloads.

mod agent;
pub mod jobs;
#[cfg(test)]
mod tests;

pub use agent::{FanOutSummary, SyncAgent};
pub use jobs::{
    DispatchAlertJob, FullSyncJob, IncrementalSyncJob, PushUpdateJob, StockChangedJob,
};
