//! Guardian behavior tests.

use std::sync::Arc;

use stockclerk_channels::{ChannelKind, ChannelRegistry};

use crate::channels::{ChannelService, ChannelServiceTrait};
use crate::events::{EventSink, MockEventSink, StockEvent};
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::secrets::SecretBox;
use crate::testing::{
    channel, mapping, product, InMemoryChannels, InMemoryMappings, InMemoryProducts,
    InMemorySyncEvents, ScriptedProvider,
};

struct Fixture {
    reconciler: Reconciler,
    channels: Arc<InMemoryChannels>,
    events: Arc<MockEventSink>,
    store: Arc<ScriptedProvider>,
    pos: Arc<ScriptedProvider>,
}

async fn fixture(config: ReconcilerConfig, current: i64, buffer: i64) -> Fixture {
    let products = Arc::new(InMemoryProducts::with(vec![product(
        "p1", "t1", "SKU-1", current, buffer,
    )]));
    let channels = Arc::new(InMemoryChannels::with(vec![
        channel("pos", "t1", ChannelKind::Pos),
        channel("store", "t1", ChannelKind::OnlineStore),
    ]));
    let mappings = Arc::new(InMemoryMappings::with(vec![
        mapping("p1", "pos", "pos-1"),
        mapping("p1", "store", "store-1"),
    ]));
    let sync_events = Arc::new(InMemorySyncEvents::default());
    let events = Arc::new(MockEventSink::new());

    let pos = Arc::new(ScriptedProvider::new(ChannelKind::Pos).with_stock("pos-1", current));
    let store = Arc::new(
        ScriptedProvider::new(ChannelKind::OnlineStore)
            .with_stock("store-1", (current - buffer).max(0)),
    );

    let registry = Arc::new(ChannelRegistry::new());
    registry.register("pos", pos.clone()).await;
    registry.register("store", store.clone()).await;

    let secret_box = Arc::new(SecretBox::new("0123456789abcdef0123456789abcdef").unwrap());
    let channel_service: Arc<dyn ChannelServiceTrait> = Arc::new(ChannelService::new(
        channels.clone(),
        registry.clone(),
        secret_box,
        events.clone() as Arc<dyn EventSink>,
    ));

    let reconciler = Reconciler::new(
        "t1".to_string(),
        config,
        products,
        channels.clone(),
        channel_service,
        mappings,
        sync_events,
        registry,
        events.clone() as Arc<dyn EventSink>,
    );

    Fixture {
        reconciler,
        channels,
        events,
        store,
        pos,
    }
}

#[tokio::test]
async fn test_synced_tenant_emits_no_drift() {
    let f = fixture(ReconcilerConfig::default(), 50, 0).await;

    let report = f.reconciler.run_pass(true).await.unwrap();
    assert_eq!(report.drifts_detected, 0);
    assert_eq!(report.drifts_repaired, 0);
    assert!(f.events.events_for("drift.detected").is_empty());
}

#[tokio::test]
async fn test_drift_detected_and_repaired_on_online_store() {
    // S2: current 50, buffer 0; store reports 42; threshold 20%.
    let f = fixture(
        ReconcilerConfig {
            auto_repair_threshold_pct: 20.0,
            ..ReconcilerConfig::default()
        },
        50,
        0,
    )
    .await;
    f.store.stock.lock().unwrap().insert("store-1".to_string(), 42);

    let report = f.reconciler.run_pass(true).await.unwrap();

    assert_eq!(report.drifts_detected, 1);
    assert_eq!(report.drifts_repaired, 1);
    assert!(!report.has_critical_drift);

    let detected = f.events.events_for("drift.detected");
    assert_eq!(detected.len(), 1);
    match &detected[0] {
        StockEvent::DriftDetected {
            drift, drift_pct, ..
        } => {
            assert_eq!(*drift, -8);
            assert!((drift_pct - 16.0).abs() < f64::EPSILON);
        }
        other => panic!("Unexpected event: {:?}", other),
    }

    // The store now reports the expected 50 again.
    assert_eq!(f.store.quantity_of("store-1"), Some(50));
    assert_eq!(f.events.events_for("drift.repaired").len(), 1);
}

#[tokio::test]
async fn test_pos_is_never_auto_repaired_by_default() {
    let f = fixture(ReconcilerConfig::default(), 50, 0).await;
    f.pos.stock.lock().unwrap().insert("pos-1".to_string(), 49);

    let report = f.reconciler.run_pass(true).await.unwrap();

    assert_eq!(report.drifts_detected, 1);
    assert_eq!(report.drifts_repaired, 0);
    // The POS still advertises its own number.
    assert_eq!(f.pos.quantity_of("pos-1"), Some(49));
}

#[tokio::test]
async fn test_pos_repair_behind_operator_knob() {
    let f = fixture(
        ReconcilerConfig {
            repair_pos_automatically: true,
            auto_repair_threshold_pct: 5.0,
            ..ReconcilerConfig::default()
        },
        50,
        0,
    )
    .await;
    // 2% drift: under the threshold, repairable with the knob on.
    f.pos.stock.lock().unwrap().insert("pos-1".to_string(), 49);

    let report = f.reconciler.run_pass(true).await.unwrap();
    assert_eq!(report.drifts_repaired, 1);
    assert_eq!(f.pos.quantity_of("pos-1"), Some(50));
}

#[tokio::test]
async fn test_auto_repair_false_only_detects() {
    let f = fixture(ReconcilerConfig::default(), 50, 0).await;
    f.store.stock.lock().unwrap().insert("store-1".to_string(), 42);

    let report = f.reconciler.run_pass(false).await.unwrap();
    assert_eq!(report.drifts_detected, 1);
    assert_eq!(report.drifts_repaired, 0);
    assert_eq!(f.store.quantity_of("store-1"), Some(42));
}

#[tokio::test]
async fn test_zero_expected_nonzero_actual_always_drifts() {
    // Large drift threshold would normally swallow a 3-unit mismatch.
    let f = fixture(
        ReconcilerConfig {
            drift_threshold: 10,
            ..ReconcilerConfig::default()
        },
        5,
        10,
    )
    .await;
    // Expected online is max(0, 5-10) = 0, but the store advertises 3.
    f.store.stock.lock().unwrap().insert("store-1".to_string(), 3);

    let report = f.reconciler.run_pass(false).await.unwrap();
    assert_eq!(report.drifts_detected, 1);
}

#[tokio::test]
async fn test_critical_drift_flagged_at_twenty_pct() {
    let f = fixture(ReconcilerConfig::default(), 100, 0).await;
    f.store.stock.lock().unwrap().insert("store-1".to_string(), 75);

    let report = f.reconciler.run_pass(false).await.unwrap();
    assert!(report.has_critical_drift);
}

#[tokio::test]
async fn test_channel_deactivated_after_three_failed_health_passes() {
    let f = fixture(ReconcilerConfig::default(), 50, 0).await;
    f.store
        .healthy
        .store(false, std::sync::atomic::Ordering::SeqCst);

    for _ in 0..2 {
        let report = f.reconciler.run_pass(false).await.unwrap();
        assert_eq!(report.channels_disconnected, 0);
    }
    assert!(f.channels.is_active("store"));

    let report = f.reconciler.run_pass(false).await.unwrap();
    assert_eq!(report.channels_disconnected, 1);
    assert!(!f.channels.is_active("store"));
    assert_eq!(f.events.events_for("channel.disconnected").len(), 1);

    // The healthy POS channel was reconciled every pass.
    assert!(f.pos.quantity_of("pos-1").is_some());
}
