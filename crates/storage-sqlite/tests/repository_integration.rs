//! Repository integration tests over a real on-disk SQLite database.

use diesel::prelude::*;
use stockclerk_channels::ChannelKind;
use stockclerk_core::channels::{ChannelRepositoryTrait, NewChannel};
use stockclerk_core::mappings::{MappingRepositoryTrait, NewMapping};
use stockclerk_core::products::{NewProduct, ProductRepositoryTrait};
use stockclerk_core::sync_events::{NewSyncEvent, SyncEventRepositoryTrait, SyncEventStatus};
use stockclerk_core::tenants::TenantRepositoryTrait;
use stockclerk_storage_sqlite::{
    db, ChannelRepository, MappingRepository, ProductRepository, SyncEventRepository,
    TenantRepository,
};

struct Fixture {
    _dir: tempfile::TempDir,
    pool: db::DbPool,
    tenants: TenantRepository,
    channels: ChannelRepository,
    products: ProductRepository,
    mappings: MappingRepository,
    sync_events: SyncEventRepository,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let url = dir.path().join("stockclerk.db");
    let pool = db::init(url.to_str().unwrap(), 4).unwrap();
    let writer = db::spawn_writer(pool.clone());

    Fixture {
        _dir: dir,
        pool: pool.clone(),
        tenants: TenantRepository::new(pool.clone()),
        channels: ChannelRepository::new(pool.clone(), writer.clone()),
        products: ProductRepository::new(pool.clone(), writer.clone()),
        mappings: MappingRepository::new(pool.clone(), writer.clone()),
        sync_events: SyncEventRepository::new(pool, writer),
    }
}

fn seed_tenant(pool: &db::DbPool, id: &str, status: &str) {
    let mut conn = db::get_connection(pool).unwrap();
    diesel::sql_query("INSERT INTO tenants (id, name, slug, plan_status) VALUES (?1, ?2, ?3, ?4)")
        .bind::<diesel::sql_types::Text, _>(id)
        .bind::<diesel::sql_types::Text, _>("Corner Deli")
        .bind::<diesel::sql_types::Text, _>(format!("slug-{}", id))
        .bind::<diesel::sql_types::Text, _>(status)
        .execute(&mut conn)
        .unwrap();
}

fn new_channel(tenant: &str, kind: ChannelKind, instance: &str) -> NewChannel {
    NewChannel {
        id: None,
        tenant_id: tenant.to_string(),
        kind,
        name: format!("{} channel", kind),
        external_instance_id: instance.to_string(),
        credentials_encrypted: "sealed-blob".to_string(),
        webhook_secret: Some("s".to_string()),
    }
}

fn new_product(tenant: &str, sku: &str, stock: i64) -> NewProduct {
    NewProduct {
        id: None,
        tenant_id: tenant.to_string(),
        sku: sku.to_string(),
        name: format!("Product {}", sku),
        barcode: None,
        current_stock: stock,
        buffer_stock: 0,
        metadata: None,
    }
}

#[tokio::test]
async fn test_tenant_discovery_filters_by_status() {
    let f = fixture();
    seed_tenant(&f.pool, "t1", "active");
    seed_tenant(&f.pool, "t2", "trialing");
    seed_tenant(&f.pool, "t3", "canceled");

    let active = f.tenants.list_active().unwrap();
    let ids: Vec<&str> = active.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2"]);
}

#[tokio::test]
async fn test_channel_webhook_routing_lookup() {
    let f = fixture();
    seed_tenant(&f.pool, "t1", "active");

    let channel = f
        .channels
        .create(new_channel("t1", ChannelKind::Pos, "shop-9"))
        .await
        .unwrap();

    // Channels start inactive; webhook routing only sees active ones.
    assert!(f
        .channels
        .find_for_webhook("t1", ChannelKind::Pos, "shop-9")
        .unwrap()
        .is_none());

    f.channels.set_active(&channel.id, true).await.unwrap();
    let found = f
        .channels
        .find_for_webhook("t1", ChannelKind::Pos, "shop-9")
        .unwrap()
        .unwrap();
    assert_eq!(found.id, channel.id);

    // Wrong kind or instance: no route.
    assert!(f
        .channels
        .find_for_webhook("t1", ChannelKind::OnlineStore, "shop-9")
        .unwrap()
        .is_none());
    assert!(f
        .channels
        .find_for_webhook("t1", ChannelKind::Pos, "other")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_product_stock_write_and_filters() {
    let f = fixture();
    seed_tenant(&f.pool, "t1", "active");

    let product = f.products.create(new_product("t1", "SKU-1", 100)).await.unwrap();
    f.products.create(new_product("t1", "SKU-2", 3)).await.unwrap();

    let updated = f.products.set_stock(&product.id, 95).await.unwrap();
    assert_eq!(updated.current_stock, 95);
    assert!(updated.updated_at >= product.updated_at);

    let low = f.products.list_below_stock("t1", 5).unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].sku, "SKU-2");

    let by_sku = f.products.get_by_sku("t1", "SKU-1").unwrap().unwrap();
    assert_eq!(by_sku.id, product.id);
}

#[tokio::test]
async fn test_duplicate_sku_per_tenant_is_rejected() {
    let f = fixture();
    seed_tenant(&f.pool, "t1", "active");
    seed_tenant(&f.pool, "t2", "active");

    f.products.create(new_product("t1", "SKU-1", 1)).await.unwrap();
    assert!(f.products.create(new_product("t1", "SKU-1", 2)).await.is_err());
    // Same SKU under another tenant is fine.
    f.products.create(new_product("t2", "SKU-1", 3)).await.unwrap();
}

#[tokio::test]
async fn test_mapping_uniqueness_and_cascade() {
    let f = fixture();
    seed_tenant(&f.pool, "t1", "active");
    let channel = f
        .channels
        .create(new_channel("t1", ChannelKind::OnlineStore, "shop-1"))
        .await
        .unwrap();
    let product = f.products.create(new_product("t1", "SKU-1", 10)).await.unwrap();

    f.mappings
        .create(NewMapping {
            id: None,
            product_id: product.id.clone(),
            channel_id: channel.id.clone(),
            external_id: "ext-1".to_string(),
            external_sku: None,
            is_manual: false,
        })
        .await
        .unwrap();

    // (channel, external_id) is unique.
    let duplicate = f
        .mappings
        .create(NewMapping {
            id: None,
            product_id: product.id.clone(),
            channel_id: channel.id.clone(),
            external_id: "ext-1".to_string(),
            external_sku: None,
            is_manual: false,
        })
        .await;
    assert!(duplicate.is_err());

    // Reverse lookup.
    let found = f
        .mappings
        .find_by_external_id(&channel.id, "ext-1")
        .unwrap()
        .unwrap();
    assert_eq!(found.product_id, product.id);

    // Deleting the product cascades to its mappings.
    f.products.delete(&product.id).await.unwrap();
    assert!(f
        .mappings
        .find_by_external_id(&channel.id, "ext-1")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_sync_event_audit_log() {
    let f = fixture();
    seed_tenant(&f.pool, "t1", "active");

    f.sync_events
        .append(NewSyncEvent::completed(
            "t1",
            "stock_changed",
            Some("c1"),
            Some("p1"),
            Some(100),
            Some(95),
        ))
        .await
        .unwrap();
    f.sync_events
        .append(NewSyncEvent::failed(
            "t1",
            "push_update",
            Some("c2"),
            Some("p1"),
            "vendor rejected",
        ))
        .await
        .unwrap();

    let recent = f.sync_events.list_recent("t1", 10).unwrap();
    assert_eq!(recent.len(), 2);
    // Most recent first.
    assert_eq!(recent[0].event_type, "push_update");
    assert_eq!(recent[0].status, SyncEventStatus::Failed);
    assert_eq!(recent[0].error_message.as_deref(), Some("vendor rejected"));

    assert!(!f.sync_events.has_open_event("p1", "c1", "stock_changed").unwrap());
}
