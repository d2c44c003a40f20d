/// Default interval between scheduled channel polls (ms).
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;

/// Default page size for catalog walks.
pub const DEFAULT_SYNC_BATCH_SIZE: usize = 100;

/// Default retry budget for sync jobs.
pub const DEFAULT_SYNC_MAX_RETRIES: u32 = 3;

/// Default interval between reconciliation passes (ms).
pub const DEFAULT_RECONCILIATION_INTERVAL_MS: u64 = 900_000;

/// Drift percentage under which auto-repair may write a channel.
pub const DEFAULT_DRIFT_AUTO_REPAIR_THRESHOLD_PCT: f64 = 5.0;

/// Drift percentage at or above which drift is flagged critical.
pub const DEFAULT_CRITICAL_DRIFT_PCT: f64 = 20.0;

/// Default low-stock alert threshold.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Consecutive failed health checks before a channel is deactivated.
pub const DEFAULT_HEALTH_FAILURES_BEFORE_DISCONNECT: u32 = 3;

/// Idempotency window for deduplicating normalized stock changes (seconds).
pub const IDEMPOTENCY_WINDOW_SECS: u64 = 60;

/// Sliding window for alert notification deduplication (seconds).
pub const ALERT_DEDUPE_WINDOW_SECS: u64 = 30 * 60;

/// Per-queue worker concurrency defaults.
pub const SYNC_CONCURRENCY: usize = 5;
pub const WEBHOOK_CONCURRENCY: usize = 10;
pub const ALERT_CONCURRENCY: usize = 3;
pub const STOCK_UPDATE_CONCURRENCY: usize = 5;

/// Queue namespace prefix: jobs live under `stockclerk:{tenant_id}:{queue}`.
pub const QUEUE_PREFIX: &str = "stockclerk";

/// Grace budget for draining in-flight jobs on shutdown (seconds).
pub const SHUTDOWN_DRAIN_SECS: u64 = 10;

/// Completed jobs are pruned after this age (seconds) or beyond this count.
pub const JOB_COMPLETED_RETENTION_SECS: u64 = 86_400;
pub const JOB_COMPLETED_RETENTION_COUNT: i64 = 500;

/// Failed jobs are retained for a week before pruning.
pub const JOB_FAILED_RETENTION_SECS: u64 = 604_800;
