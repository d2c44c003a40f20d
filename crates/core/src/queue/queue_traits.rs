//! Job queue trait.

use async_trait::async_trait;

use super::queue_model::{JobOptions, JobRecord, QueueDepth, QueueName};
use crate::errors::Result;

/// Durable, per-tenant-namespaced job queue.
///
/// Implementations must guarantee:
/// - a claimed job is invisible to other consumers until completed or failed
/// - delayed jobs stay invisible until `run_at`
/// - within a queue, visible jobs are claimed by `(priority, run_at)` order
/// - a failed job is re-queued with exponential backoff
///   (`backoff_delay_ms * 2^(attempts_made - 1)`) until its attempt budget
///   is exhausted, after which it is dead-lettered
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job. With `options.job_id` set, a duplicate enqueue within
    /// the same queue returns the existing record instead of a new one.
    async fn enqueue(
        &self,
        tenant_id: &str,
        queue: QueueName,
        name: &str,
        data: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobRecord>;

    /// Claim the next visible job, marking it active. Returns `None` when
    /// the queue has nothing runnable.
    async fn fetch_next(&self, tenant_id: &str, queue: QueueName) -> Result<Option<JobRecord>>;

    /// Mark an active job completed.
    async fn complete(&self, job_id: &str) -> Result<()>;

    /// Record a failed attempt. Re-queues with backoff while attempts
    /// remain, otherwise dead-letters. Returns the updated record.
    async fn fail(&self, job_id: &str, error: &str) -> Result<JobRecord>;

    /// Re-queue jobs left `active` by a previous incarnation of this
    /// tenant's worker. Called once at worker startup, before consumers
    /// run; claimed attempts stay counted, so a crash-looping job still
    /// exhausts its budget. Returns rows recovered.
    async fn recover_stale(&self, tenant_id: &str) -> Result<usize>;

    /// Depth snapshot for one queue.
    fn depth(&self, tenant_id: &str, queue: QueueName) -> Result<QueueDepth>;

    /// Prune completed jobs beyond the retention window/count and failed
    /// jobs beyond theirs. Returns rows removed.
    async fn prune(&self, tenant_id: &str) -> Result<usize>;
}
