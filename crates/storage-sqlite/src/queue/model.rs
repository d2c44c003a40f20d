use chrono::NaiveDateTime;
use diesel::prelude::*;

use stockclerk_core::errors::{DatabaseError, Error, Result};
use stockclerk_core::queue::{JobRecord, JobStatus, QueueName};

use crate::schema::queue_jobs;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = queue_jobs)]
pub struct QueueJobDB {
    pub id: String,
    pub tenant_id: String,
    pub queue: String,
    pub name: String,
    pub data: String,
    pub status: String,
    pub priority: i32,
    pub attempts_made: i32,
    pub max_attempts: i32,
    pub backoff_delay_ms: i64,
    pub run_at: NaiveDateTime,
    pub locked_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<QueueJobDB> for JobRecord {
    type Error = Error;

    fn try_from(row: QueueJobDB) -> Result<Self> {
        let queue = QueueName::parse(&row.queue).ok_or_else(|| {
            Error::Database(DatabaseError::Internal(format!(
                "job {} has unknown queue '{}'",
                row.id, row.queue
            )))
        })?;
        let status = JobStatus::parse(&row.status).ok_or_else(|| {
            Error::Database(DatabaseError::Internal(format!(
                "job {} has unknown status '{}'",
                row.id, row.status
            )))
        })?;
        Ok(JobRecord {
            id: row.id,
            tenant_id: row.tenant_id,
            queue,
            name: row.name,
            data: serde_json::from_str(&row.data)?,
            status,
            priority: row.priority,
            attempts_made: row.attempts_made as u32,
            max_attempts: row.max_attempts as u32,
            backoff_delay_ms: row.backoff_delay_ms as u64,
            run_at: row.run_at,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}
