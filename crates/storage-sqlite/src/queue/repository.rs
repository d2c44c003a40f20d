//! Durable job queue on SQLite.
//!
//! The namespace `(tenant_id, queue)` realizes `stockclerk:{tenant}:{queue}`.
//! Claims run on the serialized write actor, so two consumers can never
//! claim the same job. Failed jobs are re-queued with exponential backoff
//! until their attempt budget runs out, then dead-lettered.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;

use stockclerk_core::constants;
use stockclerk_core::errors::{Error, Result};
use stockclerk_core::queue::{JobOptions, JobQueue, JobRecord, QueueDepth, QueueName};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::queue_jobs;
use crate::schema::queue_jobs::dsl;

use super::model::QueueJobDB;

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

pub struct SqliteJobQueue {
    pool: DbPool,
    writer: WriteHandle,
}

impl SqliteJobQueue {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(
        &self,
        tenant_id: &str,
        queue: QueueName,
        name: &str,
        data: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobRecord> {
        let row = QueueJobDB {
            id: options
                .job_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            tenant_id: tenant_id.to_string(),
            queue: queue.as_str().to_string(),
            name: name.to_string(),
            data: data.to_string(),
            status: "waiting".to_string(),
            priority: options.priority,
            attempts_made: 0,
            max_attempts: options.max_attempts as i32,
            backoff_delay_ms: options.backoff_delay_ms as i64,
            run_at: now() + chrono::Duration::milliseconds(options.delay_ms as i64),
            locked_at: None,
            last_error: None,
            created_at: now(),
            updated_at: now(),
        };
        let custom_id = options.job_id.is_some();

        self.writer
            .exec(move |conn| {
                if custom_id {
                    // Idempotent enqueue: a duplicate id is a no-op that
                    // returns the existing job.
                    let existing = dsl::queue_jobs
                        .select(QueueJobDB::as_select())
                        .find(&row.id)
                        .first::<QueueJobDB>(conn)
                        .optional()
                        .into_core()?;
                    if let Some(existing) = existing {
                        return existing.try_into();
                    }
                }

                diesel::insert_into(queue_jobs::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                row.clone().try_into()
            })
            .await
    }

    async fn fetch_next(&self, tenant_id: &str, queue: QueueName) -> Result<Option<JobRecord>> {
        let tenant_owned = tenant_id.to_string();
        let queue_str = queue.as_str();

        self.writer
            .exec(move |conn| {
                let candidate = dsl::queue_jobs
                    .select(QueueJobDB::as_select())
                    .filter(dsl::tenant_id.eq(&tenant_owned))
                    .filter(dsl::queue.eq(queue_str))
                    .filter(dsl::status.eq("waiting"))
                    .filter(dsl::run_at.le(now()))
                    .order((dsl::priority.asc(), dsl::run_at.asc(), dsl::created_at.asc()))
                    .first::<QueueJobDB>(conn)
                    .optional()
                    .into_core()?;

                let Some(job) = candidate else {
                    return Ok(None);
                };

                diesel::update(dsl::queue_jobs.find(&job.id))
                    .set((
                        dsl::status.eq("active"),
                        dsl::attempts_made.eq(job.attempts_made + 1),
                        dsl::locked_at.eq(now()),
                        dsl::updated_at.eq(now()),
                    ))
                    .execute(conn)
                    .into_core()?;

                let claimed = dsl::queue_jobs
                    .select(QueueJobDB::as_select())
                    .find(&job.id)
                    .first::<QueueJobDB>(conn)
                    .into_core()?;
                Ok(Some(claimed.try_into()?))
            })
            .await
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        let id_owned = job_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::update(dsl::queue_jobs.find(&id_owned))
                    .set((
                        dsl::status.eq("completed"),
                        dsl::locked_at.eq(None::<NaiveDateTime>),
                        dsl::updated_at.eq(now()),
                    ))
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    async fn fail(&self, job_id: &str, error: &str) -> Result<JobRecord> {
        let id_owned = job_id.to_string();
        let error_owned = error.to_string();

        self.writer
            .exec(move |conn| {
                let job = dsl::queue_jobs
                    .select(QueueJobDB::as_select())
                    .find(&id_owned)
                    .first::<QueueJobDB>(conn)
                    .optional()
                    .into_core()?
                    .ok_or_else(|| Error::Queue(format!("unknown job {}", id_owned)))?;

                if job.attempts_made >= job.max_attempts {
                    diesel::update(dsl::queue_jobs.find(&job.id))
                        .set((
                            dsl::status.eq("dead"),
                            dsl::last_error.eq(&error_owned),
                            dsl::locked_at.eq(None::<NaiveDateTime>),
                            dsl::updated_at.eq(now()),
                        ))
                        .execute(conn)
                        .into_core()?;
                } else {
                    // Exponential backoff on the job's base delay.
                    let shift = (job.attempts_made - 1).clamp(0, 31) as u32;
                    let backoff_ms = (job.backoff_delay_ms as u64).saturating_mul(1u64 << shift);
                    diesel::update(dsl::queue_jobs.find(&job.id))
                        .set((
                            dsl::status.eq("waiting"),
                            dsl::last_error.eq(&error_owned),
                            dsl::run_at.eq(now() + chrono::Duration::milliseconds(backoff_ms as i64)),
                            dsl::locked_at.eq(None::<NaiveDateTime>),
                            dsl::updated_at.eq(now()),
                        ))
                        .execute(conn)
                        .into_core()?;
                }

                let updated = dsl::queue_jobs
                    .select(QueueJobDB::as_select())
                    .find(&job.id)
                    .first::<QueueJobDB>(conn)
                    .into_core()?;
                updated.try_into()
            })
            .await
    }

    async fn recover_stale(&self, tenant_id: &str) -> Result<usize> {
        let tenant_owned = tenant_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::update(
                    dsl::queue_jobs
                        .filter(dsl::tenant_id.eq(&tenant_owned))
                        .filter(dsl::status.eq("active")),
                )
                .set((
                    dsl::status.eq("waiting"),
                    dsl::locked_at.eq(None::<NaiveDateTime>),
                    dsl::updated_at.eq(now()),
                ))
                .execute(conn)
                .into_core()
            })
            .await
    }

    fn depth(&self, tenant_id: &str, queue: QueueName) -> Result<QueueDepth> {
        let mut conn = get_connection(&self.pool)?;

        let rows: Vec<(String, i64)> = dsl::queue_jobs
            .filter(dsl::tenant_id.eq(tenant_id))
            .filter(dsl::queue.eq(queue.as_str()))
            .group_by(dsl::status)
            .select((dsl::status, diesel::dsl::count_star()))
            .load(&mut conn)
            .into_core()?;

        let mut depth = QueueDepth::default();
        for (state, count) in rows {
            match state.as_str() {
                "waiting" => depth.waiting = count,
                "active" => depth.active = count,
                "failed" => depth.failed = count,
                "dead" => depth.dead = count,
                _ => {}
            }
        }
        Ok(depth)
    }

    async fn prune(&self, tenant_id: &str) -> Result<usize> {
        let tenant_owned = tenant_id.to_string();
        let completed_cutoff = now()
            - chrono::Duration::seconds(constants::JOB_COMPLETED_RETENTION_SECS as i64);
        let dead_cutoff =
            now() - chrono::Duration::seconds(constants::JOB_FAILED_RETENTION_SECS as i64);

        self.writer
            .exec(move |conn| {
                // Completed jobs: prune by age.
                let mut removed = diesel::delete(
                    dsl::queue_jobs
                        .filter(dsl::tenant_id.eq(&tenant_owned))
                        .filter(dsl::status.eq("completed"))
                        .filter(dsl::updated_at.lt(completed_cutoff)),
                )
                .execute(conn)
                .into_core()?;

                // ...and by count: keep only the newest N per tenant.
                let keep_ids: Vec<String> = dsl::queue_jobs
                    .filter(dsl::tenant_id.eq(&tenant_owned))
                    .filter(dsl::status.eq("completed"))
                    .order(dsl::updated_at.desc())
                    .limit(constants::JOB_COMPLETED_RETENTION_COUNT)
                    .select(dsl::id)
                    .load(conn)
                    .into_core()?;
                removed += diesel::delete(
                    dsl::queue_jobs
                        .filter(dsl::tenant_id.eq(&tenant_owned))
                        .filter(dsl::status.eq("completed"))
                        .filter(dsl::id.ne_all(keep_ids)),
                )
                .execute(conn)
                .into_core()?;

                // Dead-lettered jobs age out on the longer window.
                removed += diesel::delete(
                    dsl::queue_jobs
                        .filter(dsl::tenant_id.eq(&tenant_owned))
                        .filter(dsl::status.eq("dead"))
                        .filter(dsl::updated_at.lt(dead_cutoff)),
                )
                .execute(conn)
                .into_core()?;

                Ok(removed)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn queue_fixture() -> (SqliteJobQueue, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("queue.db");
        let pool = db::init(url.to_str().unwrap(), 4).unwrap();
        let writer = db::spawn_writer(pool.clone());
        (SqliteJobQueue::new(pool, writer), dir)
    }

    fn payload() -> serde_json::Value {
        serde_json::json!({ "productId": "p1" })
    }

    #[tokio::test]
    async fn test_enqueue_claim_complete() {
        let (queue, _dir) = queue_fixture().await;

        queue
            .enqueue("t1", QueueName::Sync, "push_update", payload(), JobOptions::default())
            .await
            .unwrap();

        let job = queue.fetch_next("t1", QueueName::Sync).await.unwrap().unwrap();
        assert_eq!(job.attempts_made, 1);

        // Claimed job is invisible to a second consumer.
        assert!(queue.fetch_next("t1", QueueName::Sync).await.unwrap().is_none());

        queue.complete(&job.id).await.unwrap();
        let depth = queue.depth("t1", QueueName::Sync).unwrap();
        assert_eq!(depth.waiting, 0);
        assert_eq!(depth.active, 0);
    }

    #[tokio::test]
    async fn test_tenants_are_namespaced() {
        let (queue, _dir) = queue_fixture().await;

        queue
            .enqueue("t1", QueueName::Sync, "push_update", payload(), JobOptions::default())
            .await
            .unwrap();

        assert!(queue.fetch_next("t2", QueueName::Sync).await.unwrap().is_none());
        assert!(queue.fetch_next("t1", QueueName::Webhook).await.unwrap().is_none());
        assert!(queue.fetch_next("t1", QueueName::Sync).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_priority_order() {
        let (queue, _dir) = queue_fixture().await;

        queue
            .enqueue("t1", QueueName::Webhook, "routine", payload(), JobOptions::default())
            .await
            .unwrap();
        queue
            .enqueue(
                "t1",
                QueueName::Webhook,
                "urgent",
                payload(),
                JobOptions::default().with_priority(1),
            )
            .await
            .unwrap();

        let first = queue.fetch_next("t1", QueueName::Webhook).await.unwrap().unwrap();
        assert_eq!(first.name, "urgent");
    }

    #[tokio::test]
    async fn test_delayed_job_is_invisible_until_due() {
        let (queue, _dir) = queue_fixture().await;

        queue
            .enqueue(
                "t1",
                QueueName::Sync,
                "later",
                payload(),
                JobOptions::default().with_delay_ms(60_000),
            )
            .await
            .unwrap();

        assert!(queue.fetch_next("t1", QueueName::Sync).await.unwrap().is_none());
        let depth = queue.depth("t1", QueueName::Sync).unwrap();
        assert_eq!(depth.waiting, 1);
    }

    #[tokio::test]
    async fn test_fail_requeues_with_backoff_then_dead_letters() {
        let (queue, _dir) = queue_fixture().await;

        queue
            .enqueue(
                "t1",
                QueueName::Sync,
                "flaky",
                payload(),
                JobOptions {
                    max_attempts: 2,
                    backoff_delay_ms: 60_000,
                    ..JobOptions::default()
                },
            )
            .await
            .unwrap();

        let job = queue.fetch_next("t1", QueueName::Sync).await.unwrap().unwrap();
        let failed = queue.fail(&job.id, "boom").await.unwrap();
        // Re-queued, but not yet runnable (backoff pushed run_at out).
        assert_eq!(failed.status, stockclerk_core::queue::JobStatus::Waiting);
        assert!(queue.fetch_next("t1", QueueName::Sync).await.unwrap().is_none());

        // Force the job due again, claim, and exhaust the budget.
        let mut conn = db::get_connection(&queue.pool).unwrap();
        diesel::update(dsl::queue_jobs.find(&job.id))
            .set(dsl::run_at.eq(now() - chrono::Duration::seconds(1)))
            .execute(&mut conn)
            .unwrap();

        let job = queue.fetch_next("t1", QueueName::Sync).await.unwrap().unwrap();
        assert_eq!(job.attempts_made, 2);
        let dead = queue.fail(&job.id, "boom again").await.unwrap();
        assert_eq!(dead.status, stockclerk_core::queue::JobStatus::Dead);
        assert_eq!(dead.last_error.as_deref(), Some("boom again"));

        let depth = queue.depth("t1", QueueName::Sync).unwrap();
        assert_eq!(depth.dead, 1);
    }

    #[tokio::test]
    async fn test_idempotent_enqueue_with_job_id() {
        let (queue, _dir) = queue_fixture().await;

        let options = JobOptions::default().with_job_id("ch1:x:evt1");
        queue
            .enqueue("t1", QueueName::Webhook, "stock_changed", payload(), options.clone())
            .await
            .unwrap();
        queue
            .enqueue("t1", QueueName::Webhook, "stock_changed", payload(), options)
            .await
            .unwrap();

        let depth = queue.depth("t1", QueueName::Webhook).unwrap();
        assert_eq!(depth.waiting, 1);
    }

    #[tokio::test]
    async fn test_recover_stale_requeues_active_without_resetting_attempts() {
        let (queue, _dir) = queue_fixture().await;

        queue
            .enqueue("t1", QueueName::Sync, "push_update", payload(), JobOptions::default())
            .await
            .unwrap();
        let claimed = queue.fetch_next("t1", QueueName::Sync).await.unwrap().unwrap();
        assert_eq!(claimed.attempts_made, 1);

        // Simulated worker reboot: the active job is stranded.
        assert_eq!(queue.recover_stale("t1").await.unwrap(), 1);

        let reclaimed = queue.fetch_next("t1", QueueName::Sync).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, claimed.id);
        // The earlier claim still counts against the budget.
        assert_eq!(reclaimed.attempts_made, 2);
    }

    #[tokio::test]
    async fn test_prune_removes_old_completed() {
        let (queue, _dir) = queue_fixture().await;

        let job = queue
            .enqueue("t1", QueueName::Sync, "done", payload(), JobOptions::default())
            .await
            .unwrap();
        let claimed = queue.fetch_next("t1", QueueName::Sync).await.unwrap().unwrap();
        queue.complete(&claimed.id).await.unwrap();

        // Age the completed row past the retention window.
        let mut conn = db::get_connection(&queue.pool).unwrap();
        let old = now() - chrono::Duration::seconds(constants::JOB_COMPLETED_RETENTION_SECS as i64 + 10);
        diesel::update(dsl::queue_jobs.find(&job.id))
            .set(dsl::updated_at.eq(old))
            .execute(&mut conn)
            .unwrap();

        let removed = queue.prune("t1").await.unwrap();
        assert_eq!(removed, 1);
    }
}
