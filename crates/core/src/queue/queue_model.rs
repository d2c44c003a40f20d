//! Job queue domain models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::constants;

/// The four per-tenant queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueName {
    Sync,
    Webhook,
    Alert,
    StockUpdate,
}

impl QueueName {
    pub const ALL: [QueueName; 4] = [
        QueueName::Sync,
        QueueName::Webhook,
        QueueName::Alert,
        QueueName::StockUpdate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Webhook => "webhook",
            Self::Alert => "alert",
            Self::StockUpdate => "stockUpdate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sync" => Some(Self::Sync),
            "webhook" => Some(Self::Webhook),
            "alert" => Some(Self::Alert),
            "stockUpdate" => Some(Self::StockUpdate),
            _ => None,
        }
    }

    /// Fully-qualified queue namespace, e.g. `stockclerk:t1:webhook`.
    pub fn namespaced(self, tenant_id: &str) -> String {
        format!("{}:{}:{}", constants::QUEUE_PREFIX, tenant_id, self.as_str())
    }

    /// Default attempt budget. Webhooks get two extra attempts because the
    /// vendor will not redeliver once we have returned 200.
    pub fn default_attempts(self) -> u32 {
        match self {
            Self::Webhook => 5,
            _ => 3,
        }
    }

    /// Bounded in-flight jobs per queue inside one worker.
    pub fn concurrency(self) -> usize {
        match self {
            Self::Sync => constants::SYNC_CONCURRENCY,
            Self::Webhook => constants::WEBHOOK_CONCURRENCY,
            Self::Alert => constants::ALERT_CONCURRENCY,
            Self::StockUpdate => constants::STOCK_UPDATE_CONCURRENCY,
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
    /// Attempts exhausted; retained for inspection.
    Dead,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

/// Options for enqueueing a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub max_attempts: u32,
    /// Base delay for the exponential retry backoff.
    pub backoff_delay_ms: u64,
    /// Lower value = higher priority. Webhooks enqueue at 1.
    pub priority: i32,
    /// Delay before the job becomes visible.
    pub delay_ms: u64,
    /// Custom job id for idempotent enqueueing; a second enqueue with the
    /// same id within the queue is a no-op.
    pub job_id: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_delay_ms: 1_000,
            priority: 10,
            delay_ms: 0,
            job_id: None,
        }
    }
}

impl JobOptions {
    /// Defaults for a queue, per its attempt budget.
    pub fn for_queue(queue: QueueName) -> Self {
        Self {
            max_attempts: queue.default_attempts(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

/// A persisted job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub tenant_id: String,
    pub queue: QueueName,
    /// Job type name, e.g. `stock_changed`.
    pub name: String,
    pub data: serde_json::Value,
    pub status: JobStatus,
    pub priority: i32,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff_delay_ms: u64,
    /// Not visible to consumers before this instant.
    pub run_at: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Per-queue depth snapshot for health reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDepth {
    pub waiting: i64,
    pub active: i64,
    pub failed: i64,
    pub dead: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_namespacing() {
        assert_eq!(
            QueueName::Webhook.namespaced("t42"),
            "stockclerk:t42:webhook"
        );
        assert_eq!(
            QueueName::StockUpdate.namespaced("t42"),
            "stockclerk:t42:stockUpdate"
        );
    }

    #[test]
    fn test_webhook_gets_five_attempts() {
        assert_eq!(QueueName::Webhook.default_attempts(), 5);
        assert_eq!(QueueName::Sync.default_attempts(), 3);
        assert_eq!(QueueName::Alert.default_attempts(), 3);
        assert_eq!(QueueName::StockUpdate.default_attempts(), 3);
    }

    #[test]
    fn test_concurrency_defaults() {
        assert_eq!(QueueName::Sync.concurrency(), 5);
        assert_eq!(QueueName::Webhook.concurrency(), 10);
        assert_eq!(QueueName::Alert.concurrency(), 3);
        assert_eq!(QueueName::StockUpdate.concurrency(), 5);
    }

    #[test]
    fn test_queue_name_round_trip() {
        for queue in QueueName::ALL {
            assert_eq!(QueueName::parse(queue.as_str()), Some(queue));
        }
    }
}
