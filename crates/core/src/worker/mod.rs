//! The tenant worker: context, runtime, and per-product serialization.

mod context;
mod locks;
mod runtime;

pub use context::WorkerContext;
pub use locks::ProductLocks;
pub use runtime::{SyncScope, WorkerHealth, WorkerRuntime};
