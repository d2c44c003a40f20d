use chrono::NaiveDateTime;
use diesel::prelude::*;

use stockclerk_core::alerts::{Alert, AlertKind, AlertRule, AlertSeverity, RuleAction, RuleConditions};
use stockclerk_core::errors::{DatabaseError, Error, Result};

use crate::schema::{alert_rules, alerts};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = alerts)]
pub struct AlertDB {
    pub id: String,
    pub tenant_id: String,
    pub kind: String,
    pub severity: String,
    pub message: String,
    pub metadata: Option<String>,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

impl TryFrom<AlertDB> for Alert {
    type Error = Error;

    fn try_from(row: AlertDB) -> Result<Self> {
        let kind = AlertKind::parse(&row.kind).ok_or_else(|| {
            Error::Database(DatabaseError::Internal(format!(
                "alert {} has unknown kind '{}'",
                row.id, row.kind
            )))
        })?;
        let severity = AlertSeverity::parse(&row.severity).ok_or_else(|| {
            Error::Database(DatabaseError::Internal(format!(
                "alert {} has unknown severity '{}'",
                row.id, row.severity
            )))
        })?;
        Ok(Alert {
            id: row.id,
            tenant_id: row.tenant_id,
            kind,
            severity,
            message: row.message,
            metadata: row.metadata,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = alert_rules)]
pub struct AlertRuleDB {
    pub id: String,
    pub tenant_id: String,
    pub kind: String,
    pub conditions: String,
    pub actions: String,
    pub is_active: bool,
}

impl TryFrom<AlertRuleDB> for AlertRule {
    type Error = Error;

    fn try_from(row: AlertRuleDB) -> Result<Self> {
        let kind = AlertKind::parse(&row.kind).ok_or_else(|| {
            Error::Database(DatabaseError::Internal(format!(
                "alert rule {} has unknown kind '{}'",
                row.id, row.kind
            )))
        })?;
        let conditions: RuleConditions = serde_json::from_str(&row.conditions)?;
        let actions: Vec<RuleAction> = serde_json::from_str(&row.actions)?;
        Ok(AlertRule {
            id: row.id,
            tenant_id: row.tenant_id,
            kind,
            conditions,
            actions,
            is_active: row.is_active,
        })
    }
}
