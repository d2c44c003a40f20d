//! Alert agent behavior tests.

use std::sync::Arc;

use crate::alerting::AlertAgent;
use crate::alerts::{AlertKind, AlertRule, AlertSeverity, RuleAction, RuleConditions};
use crate::events::StockEvent;
use crate::products::ProductRepositoryTrait;
use crate::queue::QueueName;
use crate::testing::{product, InMemoryAlerts, InMemoryProducts, InMemoryQueue};

fn rule(kind: AlertKind, conditions: RuleConditions) -> AlertRule {
    AlertRule {
        id: format!("rule-{}", kind.as_str()),
        tenant_id: "t1".to_string(),
        kind,
        conditions,
        actions: vec![RuleAction::Notify],
        is_active: true,
    }
}

struct Fixture {
    agent: AlertAgent,
    alerts: Arc<InMemoryAlerts>,
    products: Arc<InMemoryProducts>,
    queue: Arc<InMemoryQueue>,
}

fn fixture(rules: Vec<AlertRule>, products: Vec<crate::products::Product>) -> Fixture {
    let alerts = Arc::new(InMemoryAlerts::with_rules(rules));
    let products = Arc::new(InMemoryProducts::with(products));
    let queue = Arc::new(InMemoryQueue::default());
    let agent = AlertAgent::new(
        "t1".to_string(),
        alerts.clone(),
        products.clone(),
        queue.clone(),
    );
    Fixture {
        agent,
        alerts,
        products,
        queue,
    }
}

fn stock_change(product_id: &str) -> StockEvent {
    StockEvent::StockChange {
        product_id: product_id.to_string(),
        channel_id: "store".to_string(),
        old_quantity: 0,
        new_quantity: 0,
    }
}

#[tokio::test]
async fn test_low_stock_oscillation_writes_rows_dispatches_once() {
    // S6: threshold 10, stock oscillates 8 -> 9 -> 8 inside the window.
    let f = fixture(
        vec![rule(
            AlertKind::LowStock,
            RuleConditions {
                threshold: Some(10),
                ..RuleConditions::default()
            },
        )],
        vec![product("p1", "t1", "SKU-1", 8, 0)],
    );

    for stock in [8, 9, 8] {
        f.products
            .set_stock("p1", stock)
            .await
            .unwrap();
        f.agent.observe(&stock_change("p1")).await.unwrap();
    }

    // Three alert rows, one dispatched notification.
    assert_eq!(f.alerts.all().len(), 3);
    assert_eq!(f.queue.depth_of("t1", QueueName::Alert), 1);
}

#[tokio::test]
async fn test_low_stock_severity_ladder() {
    let f = fixture(
        vec![rule(
            AlertKind::LowStock,
            RuleConditions {
                threshold: Some(10),
                ..RuleConditions::default()
            },
        )],
        vec![product("p1", "t1", "SKU-1", 8, 0)],
    );

    // 8 of 10: info.
    f.agent.observe(&stock_change("p1")).await.unwrap();
    // 5 of 10: warning (<= threshold/2).
    f.products.set_stock("p1", 5).await.unwrap();
    f.agent.observe(&stock_change("p1")).await.unwrap();
    // 0: critical.
    f.products.set_stock("p1", 0).await.unwrap();
    f.agent.observe(&stock_change("p1")).await.unwrap();

    let severities: Vec<AlertSeverity> = f.alerts.all().iter().map(|a| a.severity).collect();
    assert_eq!(
        severities,
        vec![
            AlertSeverity::Info,
            AlertSeverity::Warning,
            AlertSeverity::Critical
        ]
    );
}

#[tokio::test]
async fn test_low_stock_defaults_to_buffer_threshold() {
    let f = fixture(
        vec![rule(AlertKind::LowStock, RuleConditions::default())],
        vec![product("p1", "t1", "SKU-1", 12, 10)],
    );

    // 12 > buffer 10: quiet.
    f.agent.observe(&stock_change("p1")).await.unwrap();
    assert!(f.alerts.all().is_empty());

    // 9 <= buffer 10: fires.
    f.products.set_stock("p1", 9).await.unwrap();
    f.agent.observe(&stock_change("p1")).await.unwrap();
    assert_eq!(f.alerts.all().len(), 1);
}

#[tokio::test]
async fn test_sync_error_rule_with_channel_filter() {
    let f = fixture(
        vec![rule(
            AlertKind::SyncError,
            RuleConditions {
                channel_ids: Some(vec!["store".to_string()]),
                ..RuleConditions::default()
            },
        )],
        vec![],
    );

    // Filtered-out channel: no alert.
    f.agent
        .observe(&StockEvent::SyncFailed {
            product_id: "p1".to_string(),
            channel_id: Some("market".to_string()),
            error: "429".to_string(),
        })
        .await
        .unwrap();
    assert!(f.alerts.all().is_empty());

    // Matching channel: warning alert.
    f.agent
        .observe(&StockEvent::SyncFailed {
            product_id: "p1".to_string(),
            channel_id: Some("store".to_string()),
            error: "422".to_string(),
        })
        .await
        .unwrap();
    let alerts = f.alerts.all();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Warning);
}

#[tokio::test]
async fn test_drift_rule_threshold_and_ladder() {
    let f = fixture(
        vec![rule(AlertKind::DriftDetected, RuleConditions::default())],
        vec![],
    );

    let drift_event = |pct: f64| StockEvent::DriftDetected {
        product_id: "p1".to_string(),
        channel_id: "store".to_string(),
        actual: 0,
        expected: 100,
        drift: -(pct as i64),
        drift_pct: pct,
        auto_repair: true,
    };

    // Under the default 15% rule threshold: nothing.
    f.agent.observe(&drift_event(10.0)).await.unwrap();
    assert!(f.alerts.all().is_empty());

    // 16%: info. 30%: warning. 60%: critical.
    f.agent.observe(&drift_event(16.0)).await.unwrap();
    f.agent.observe(&drift_event(30.0)).await.unwrap();
    f.agent.observe(&drift_event(60.0)).await.unwrap();

    let severities: Vec<AlertSeverity> = f.alerts.all().iter().map(|a| a.severity).collect();
    assert_eq!(
        severities,
        vec![
            AlertSeverity::Info,
            AlertSeverity::Warning,
            AlertSeverity::Critical
        ]
    );

    // Metadata carries the repair flag.
    let metadata = f.alerts.all()[0].metadata.clone().unwrap();
    assert!(metadata.contains("\"autoRepair\":true"));
}

#[tokio::test]
async fn test_channel_disconnected_alerts_without_a_rule() {
    let f = fixture(vec![], vec![]);

    f.agent
        .observe(&StockEvent::ChannelDisconnected {
            channel_id: "store".to_string(),
            reason: "3 consecutive failed health checks".to_string(),
        })
        .await
        .unwrap();

    let alerts = f.alerts.all();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::ChannelDisconnected);
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    // No rule, no actions: nothing to dispatch.
    assert_eq!(f.queue.depth_of("t1", QueueName::Alert), 0);
}

#[tokio::test]
async fn test_inactive_rules_are_ignored() {
    let mut inactive = rule(
        AlertKind::LowStock,
        RuleConditions {
            threshold: Some(10),
            ..RuleConditions::default()
        },
    );
    inactive.is_active = false;

    let f = fixture(vec![inactive], vec![product("p1", "t1", "SKU-1", 2, 0)]);
    f.agent.observe(&stock_change("p1")).await.unwrap();
    assert!(f.alerts.all().is_empty());
}
