//! Sync agent behavior tests against in-memory repositories and scripted
//! providers.

use std::sync::Arc;
use std::time::Duration;

use stockclerk_channels::{ChannelError, ChannelKind, ChannelRegistry, RetryPolicy};

use crate::events::{EventSink, MockEventSink};
use crate::sync::jobs::{FullSyncJob, IncrementalSyncJob, PushUpdateJob, StockChangedJob};
use crate::sync::SyncAgent;
use crate::testing::{
    channel, mapping, product, InMemoryChannels, InMemoryMappings, InMemoryProducts,
    InMemorySyncEvents, ScriptedProvider,
};

struct Fixture {
    agent: SyncAgent,
    products: Arc<InMemoryProducts>,
    sync_events: Arc<InMemorySyncEvents>,
    events: Arc<MockEventSink>,
    pos: Arc<ScriptedProvider>,
    store: Arc<ScriptedProvider>,
    market: Arc<ScriptedProvider>,
}

/// One product (stock 100, buffer 10) mapped to POS, storefront, and
/// marketplace channels whose vendor-side quantities are already in sync.
async fn fixture() -> Fixture {
    let products = Arc::new(InMemoryProducts::with(vec![product(
        "p1", "t1", "SKU-1", 100, 10,
    )]));
    let channels = Arc::new(InMemoryChannels::with(vec![
        channel("pos", "t1", ChannelKind::Pos),
        channel("store", "t1", ChannelKind::OnlineStore),
        channel("market", "t1", ChannelKind::DeliveryMarketplace),
    ]));
    let mappings = Arc::new(InMemoryMappings::with(vec![
        mapping("p1", "pos", "pos-1"),
        mapping("p1", "store", "store-1"),
        mapping("p1", "market", "market-1"),
    ]));
    let sync_events = Arc::new(InMemorySyncEvents::default());
    let events = Arc::new(MockEventSink::new());

    let pos = Arc::new(ScriptedProvider::new(ChannelKind::Pos).with_stock("pos-1", 100));
    let store = Arc::new(ScriptedProvider::new(ChannelKind::OnlineStore).with_stock("store-1", 90));
    let market =
        Arc::new(ScriptedProvider::new(ChannelKind::DeliveryMarketplace).with_stock("market-1", 90));

    let registry = Arc::new(ChannelRegistry::with_policy(RetryPolicy {
        max_attempts: 3,
        rate_limit_attempts: 5,
        backoff: stockclerk_channels::Backoff {
            base: Duration::from_millis(2),
            cap: Duration::from_millis(10),
        },
    }));
    registry.register("pos", pos.clone()).await;
    registry.register("store", store.clone()).await;
    registry.register("market", market.clone()).await;

    let agent = SyncAgent::new(
        "t1".to_string(),
        products.clone(),
        channels.clone(),
        mappings.clone(),
        sync_events.clone(),
        registry,
        events.clone() as Arc<dyn EventSink>,
        Arc::new(crate::worker::ProductLocks::new()),
    );

    Fixture {
        agent,
        products,
        sync_events,
        events,
        pos,
        store,
        market,
    }
}

fn pos_sale_job(new_quantity: i64, stamp: &str) -> StockChangedJob {
    StockChangedJob {
        channel_id: "pos".to_string(),
        external_id: "pos-1".to_string(),
        previous_quantity: Some(100),
        new_quantity: Some(new_quantity),
        is_available: None,
        reason: Some("sale".to_string()),
        idempotency_key: format!("pos:pos-1:{}", stamp),
    }
}

#[tokio::test]
async fn test_pos_sale_buffers_online_channels() {
    let f = fixture().await;

    // POS reports 95 after a sale of 5.
    f.agent
        .handle_stock_changed(pos_sale_job(95, "evt-1"))
        .await
        .unwrap();

    assert_eq!(f.products.stock_of("p1"), 95);
    // Online channels get the buffered quantity, 95 - 10.
    assert_eq!(f.store.quantity_of("store-1"), Some(85));
    assert_eq!(f.market.quantity_of("market-1"), Some(85));
    // The POS is the source and is not written.
    assert_eq!(f.pos.write_count(), 0);

    // Audit log: one stock_changed for the source update plus one
    // completed push_update per non-source mapping.
    assert_eq!(f.sync_events.of_type("stock_changed").len(), 1);
    assert_eq!(f.sync_events.of_type("push_update").len(), 2);

    // Bus: two stock.change emissions and one sync.completed.
    assert_eq!(f.events.events_for("stock.change").len(), 2);
    assert_eq!(f.events.events_for("sync.completed").len(), 1);
    assert!(f.events.events_for("sync.failed").is_empty());
}

#[tokio::test]
async fn test_negative_stock_is_clamped_and_logged() {
    let f = fixture().await;

    // Storefront reports an oversell: previous 90, now -3 (vendor bug).
    let job = StockChangedJob {
        channel_id: "store".to_string(),
        external_id: "store-1".to_string(),
        previous_quantity: Some(90),
        new_quantity: Some(-103),
        is_available: None,
        reason: None,
        idempotency_key: "store:store-1:evt-2".to_string(),
    };
    f.agent.handle_stock_changed(job).await.unwrap();

    assert_eq!(f.products.stock_of("p1"), 0);
    assert_eq!(f.sync_events.of_type("sync_error").len(), 1);
    // Fan-out still ran with the clamped value.
    assert_eq!(f.pos.quantity_of("pos-1"), Some(0));
    assert_eq!(f.market.quantity_of("market-1"), Some(0));
}

#[tokio::test]
async fn test_duplicate_idempotency_key_is_dropped() {
    let f = fixture().await;

    f.agent
        .handle_stock_changed(pos_sale_job(95, "evt-1"))
        .await
        .unwrap();
    let writes_after_first = f.store.write_count();

    // Same stamp again: no further writes, no further audit rows.
    f.agent
        .handle_stock_changed(pos_sale_job(95, "evt-1"))
        .await
        .unwrap();
    assert_eq!(f.store.write_count(), writes_after_first);
    assert_eq!(f.sync_events.of_type("stock_changed").len(), 1);
}

#[tokio::test]
async fn test_applying_same_change_twice_is_stable() {
    let f = fixture().await;

    f.agent
        .handle_stock_changed(pos_sale_job(95, "evt-1"))
        .await
        .unwrap();
    // A distinct event carrying the same quantity converges on the same
    // state.
    f.agent
        .handle_stock_changed(StockChangedJob {
            previous_quantity: Some(95),
            ..pos_sale_job(95, "evt-2")
        })
        .await
        .unwrap();

    assert_eq!(f.products.stock_of("p1"), 95);
    assert_eq!(f.store.quantity_of("store-1"), Some(85));
}

#[tokio::test]
async fn test_buffered_source_uses_delta() {
    let f = fixture().await;

    // Storefront sells one: 90 -> 89. Merchant total goes 100 -> 99.
    let job = StockChangedJob {
        channel_id: "store".to_string(),
        external_id: "store-1".to_string(),
        previous_quantity: Some(90),
        new_quantity: Some(89),
        is_available: None,
        reason: Some("sale".to_string()),
        idempotency_key: "store:store-1:evt-3".to_string(),
    };
    f.agent.handle_stock_changed(job).await.unwrap();

    assert_eq!(f.products.stock_of("p1"), 99);
    // POS sees the full total; marketplace the buffered one.
    assert_eq!(f.pos.quantity_of("pos-1"), Some(99));
    assert_eq!(f.market.quantity_of("market-1"), Some(89));
}

#[tokio::test]
async fn test_buffered_source_without_previous_adds_buffer() {
    let f = fixture().await;

    let job = StockChangedJob {
        channel_id: "store".to_string(),
        external_id: "store-1".to_string(),
        previous_quantity: None,
        new_quantity: Some(80),
        is_available: None,
        reason: None,
        idempotency_key: "store:store-1:evt-4".to_string(),
    };
    f.agent.handle_stock_changed(job).await.unwrap();

    // 80 advertised + 10 buffer = 90 total.
    assert_eq!(f.products.stock_of("p1"), 90);
}

#[tokio::test]
async fn test_availability_flip_reasserts_expected() {
    let f = fixture().await;

    // Marketplace toggled the item unavailable without a count; the
    // merchant's stock is untouched and the expected value is pushed back.
    let job = StockChangedJob {
        channel_id: "market".to_string(),
        external_id: "market-1".to_string(),
        previous_quantity: None,
        new_quantity: None,
        is_available: Some(false),
        reason: None,
        idempotency_key: "market:market-1:evt-5".to_string(),
    };
    f.agent.handle_stock_changed(job).await.unwrap();

    assert_eq!(f.products.stock_of("p1"), 100);
    assert_eq!(f.market.quantity_of("market-1"), Some(90));
}

#[tokio::test]
async fn test_unknown_external_id_is_dropped() {
    let f = fixture().await;

    let job = StockChangedJob {
        channel_id: "pos".to_string(),
        external_id: "not-mapped".to_string(),
        previous_quantity: None,
        new_quantity: Some(7),
        is_available: None,
        reason: None,
        idempotency_key: "pos:not-mapped:evt-6".to_string(),
    };
    f.agent.handle_stock_changed(job).await.unwrap();

    assert_eq!(f.products.stock_of("p1"), 100);
    assert!(f.sync_events.all().is_empty());
}

#[tokio::test]
async fn test_transient_write_failure_is_retried() {
    let f = fixture().await;
    f.store.fail_next_writes(2, || ChannelError::Transient {
        provider: "SCRIPTED_STORE".to_string(),
        message: "502".to_string(),
    });

    f.agent
        .handle_stock_changed(pos_sale_job(95, "evt-1"))
        .await
        .unwrap();

    // Two failures then success, within the 3-attempt budget.
    assert_eq!(f.store.quantity_of("store-1"), Some(85));
    assert!(f.events.events_for("sync.failed").is_empty());
}

#[tokio::test]
async fn test_terminal_write_failure_emits_sync_failed() {
    let f = fixture().await;
    f.store.fail_next_writes(10, || ChannelError::Rejected {
        provider: "SCRIPTED_STORE".to_string(),
        message: "422".to_string(),
    });

    f.agent
        .handle_stock_changed(pos_sale_job(95, "evt-1"))
        .await
        .unwrap();

    // The database update stands even though one channel failed.
    assert_eq!(f.products.stock_of("p1"), 95);
    // The failing mapping got a failed push_update row; the other one
    // completed.
    let pushes = f.sync_events.of_type("push_update");
    assert_eq!(pushes.len(), 2);
    assert_eq!(f.events.events_for("sync.failed").len(), 1);
    // Marketplace still got its write.
    assert_eq!(f.market.quantity_of("market-1"), Some(85));
}

#[tokio::test]
async fn test_push_update_writes_one_channel() {
    let f = fixture().await;

    f.agent
        .handle_push_update(PushUpdateJob {
            product_id: "p1".to_string(),
            channel_id: "store".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(f.store.quantity_of("store-1"), Some(90));
    assert_eq!(f.pos.write_count(), 0);
    assert_eq!(f.market.write_count(), 0);
}

#[tokio::test]
async fn test_incremental_sync_adopts_channel_state() {
    let f = fixture().await;

    // The storefront sold down to 80 while we were not listening; the
    // incremental pass adopts it as 80 + buffer = 90 total.
    f.store.stock.lock().unwrap().insert("store-1".to_string(), 80);

    f.agent
        .handle_incremental_sync(IncrementalSyncJob {
            channel_id: "store".to_string(),
            since: None,
        })
        .await
        .unwrap();

    assert_eq!(f.products.stock_of("p1"), 90);
    assert_eq!(f.pos.quantity_of("pos-1"), Some(90));
    assert_eq!(f.market.quantity_of("market-1"), Some(80));
}

#[tokio::test]
async fn test_incremental_sync_on_synced_channel_is_a_noop() {
    let f = fixture().await;

    f.agent
        .handle_incremental_sync(IncrementalSyncJob {
            channel_id: "store".to_string(),
            since: None,
        })
        .await
        .unwrap();

    assert_eq!(f.products.stock_of("p1"), 100);
    assert_eq!(f.pos.write_count(), 0);
    assert!(f.sync_events.of_type("stock_changed").is_empty());
}

#[tokio::test]
async fn test_full_sync_pushes_every_mapping() {
    let f = fixture().await;
    // Drift the storefront first.
    f.store.stock.lock().unwrap().insert("store-1".to_string(), 12);

    f.agent
        .handle_full_sync(FullSyncJob {
            channel_id: "store".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(f.store.quantity_of("store-1"), Some(90));
}
