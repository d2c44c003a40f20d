mod queue_model;
mod queue_traits;

pub use queue_model::{JobOptions, JobRecord, JobStatus, QueueDepth, QueueName};
pub use queue_traits::JobQueue;
