use async_trait::async_trait;
use diesel::prelude::*;

use stockclerk_core::alerts::{Alert, AlertRepositoryTrait, AlertRule, NewAlert};
use stockclerk_core::errors::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::alerts;
use crate::schema::alerts::dsl::*;

use super::model::{AlertDB, AlertRuleDB};

pub struct AlertRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl AlertRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl AlertRepositoryTrait for AlertRepository {
    async fn create(&self, new_alert: NewAlert) -> Result<Alert> {
        let row = AlertDB {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: new_alert.tenant_id,
            kind: new_alert.kind.as_str().to_string(),
            severity: new_alert.severity.as_str().to_string(),
            message: new_alert.message,
            metadata: new_alert.metadata,
            is_read: false,
            created_at: chrono::Utc::now().naive_utc(),
        };

        self.writer
            .exec(move |conn| {
                diesel::insert_into(alerts::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                row.clone().try_into()
            })
            .await
    }

    fn list_unread(&self, tenant_id_param: &str) -> Result<Vec<Alert>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = alerts
            .select(AlertDB::as_select())
            .filter(tenant_id.eq(tenant_id_param))
            .filter(is_read.eq(false))
            .order(created_at.desc())
            .load::<AlertDB>(&mut conn)
            .into_core()?;
        rows.into_iter().map(Alert::try_from).collect()
    }

    async fn mark_read(&self, alert_id: &str) -> Result<()> {
        let id_owned = alert_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::update(alerts.find(&id_owned))
                    .set(is_read.eq(true))
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    async fn prune_older_than(&self, tenant_id_param: &str, max_age_secs: u64) -> Result<usize> {
        let tenant_owned = tenant_id_param.to_string();
        let cutoff =
            chrono::Utc::now().naive_utc() - chrono::Duration::seconds(max_age_secs as i64);
        self.writer
            .exec(move |conn| {
                diesel::delete(
                    alerts
                        .filter(tenant_id.eq(&tenant_owned))
                        .filter(is_read.eq(true))
                        .filter(created_at.lt(cutoff)),
                )
                .execute(conn)
                .into_core()
            })
            .await
    }

    fn list_active_rules(&self, tenant_id_param: &str) -> Result<Vec<AlertRule>> {
        use crate::schema::alert_rules::dsl as rules_dsl;

        let mut conn = get_connection(&self.pool)?;
        let rows = rules_dsl::alert_rules
            .select(AlertRuleDB::as_select())
            .filter(rules_dsl::tenant_id.eq(tenant_id_param))
            .filter(rules_dsl::is_active.eq(true))
            .load::<AlertRuleDB>(&mut conn)
            .into_core()?;
        rows.into_iter().map(AlertRule::try_from).collect()
    }
}
