//! In-memory fakes shared by the agent tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use stockclerk_channels::models::{
    ChannelCredentials, ChannelItem, HealthStatus, WebhookStockChange,
};
use stockclerk_channels::provider::{ProviderCapabilities, RateLimit};
use stockclerk_channels::signature::SignatureAlgorithm;
use stockclerk_channels::{ChannelError, ChannelKind, ChannelProvider};

use crate::alerts::{Alert, AlertRepositoryTrait, AlertRule, NewAlert};
use crate::channels::{Channel, ChannelRepositoryTrait, NewChannel};
use crate::errors::{DatabaseError, Error, Result};
use crate::mappings::{MappingRepositoryTrait, NewMapping, ProductChannelMapping};
use crate::products::{NewProduct, Product, ProductRepositoryTrait};
use crate::sync_events::{NewSyncEvent, SyncEventRecord, SyncEventRepositoryTrait};

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

fn next_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4())
}

// ============================================================================
// Builders
// ============================================================================

pub fn product(id: &str, tenant_id: &str, sku: &str, current: i64, buffer: i64) -> Product {
    Product {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        sku: sku.to_string(),
        name: format!("Product {}", sku),
        barcode: None,
        current_stock: current,
        buffer_stock: buffer,
        metadata: None,
        created_at: now(),
        updated_at: now(),
    }
}

pub fn channel(id: &str, tenant_id: &str, kind: ChannelKind) -> Channel {
    Channel {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        kind,
        name: format!("{} channel", kind),
        external_instance_id: format!("inst-{}", id),
        credentials_encrypted: "sealed".to_string(),
        webhook_secret: Some("s".to_string()),
        is_active: true,
        last_sync_at: None,
        created_at: now(),
    }
}

pub fn mapping(product_id: &str, channel_id: &str, external_id: &str) -> ProductChannelMapping {
    ProductChannelMapping {
        id: next_id("map"),
        product_id: product_id.to_string(),
        channel_id: channel_id.to_string(),
        external_id: external_id.to_string(),
        external_sku: None,
        is_manual: false,
        created_at: now(),
    }
}

// ============================================================================
// In-memory repositories
// ============================================================================

#[derive(Default)]
pub struct InMemoryProducts {
    rows: Mutex<HashMap<String, Product>>,
}

impl InMemoryProducts {
    pub fn with(products: Vec<Product>) -> Self {
        Self {
            rows: Mutex::new(products.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    pub fn stock_of(&self, product_id: &str) -> i64 {
        self.rows.lock().unwrap()[product_id].current_stock
    }
}

#[async_trait]
impl ProductRepositoryTrait for InMemoryProducts {
    async fn create(&self, new_product: NewProduct) -> Result<Product> {
        let row = Product {
            id: new_product.id.unwrap_or_else(|| next_id("prd")),
            tenant_id: new_product.tenant_id,
            sku: new_product.sku,
            name: new_product.name,
            barcode: new_product.barcode,
            current_stock: new_product.current_stock,
            buffer_stock: new_product.buffer_stock,
            metadata: new_product.metadata,
            created_at: now(),
            updated_at: now(),
        };
        self.rows.lock().unwrap().insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn delete(&self, product_id: &str) -> Result<usize> {
        Ok(self.rows.lock().unwrap().remove(product_id).map_or(0, |_| 1))
    }

    fn get_by_id(&self, product_id: &str) -> Result<Product> {
        self.rows
            .lock()
            .unwrap()
            .get(product_id)
            .cloned()
            .ok_or_else(|| Error::Database(DatabaseError::NotFound(product_id.to_string())))
    }

    fn get_by_sku(&self, tenant_id: &str, sku: &str) -> Result<Option<Product>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|p| p.tenant_id == tenant_id && p.sku == sku)
            .cloned())
    }

    fn list(&self, tenant_id: &str) -> Result<Vec<Product>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn list_below_stock(&self, tenant_id: &str, threshold: i64) -> Result<Vec<Product>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.current_stock <= threshold)
            .cloned()
            .collect())
    }

    async fn set_stock(&self, product_id: &str, new_stock: i64) -> Result<Product> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(product_id)
            .ok_or_else(|| Error::Database(DatabaseError::NotFound(product_id.to_string())))?;
        row.current_stock = new_stock;
        row.updated_at = now();
        Ok(row.clone())
    }

    async fn set_buffer(&self, product_id: &str, buffer_stock: i64) -> Result<Product> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(product_id)
            .ok_or_else(|| Error::Database(DatabaseError::NotFound(product_id.to_string())))?;
        row.buffer_stock = buffer_stock;
        row.updated_at = now();
        Ok(row.clone())
    }
}

#[derive(Default)]
pub struct InMemoryChannels {
    rows: Mutex<HashMap<String, Channel>>,
}

impl InMemoryChannels {
    pub fn with(channels: Vec<Channel>) -> Self {
        Self {
            rows: Mutex::new(channels.into_iter().map(|c| (c.id.clone(), c)).collect()),
        }
    }

    pub fn is_active(&self, channel_id: &str) -> bool {
        self.rows.lock().unwrap()[channel_id].is_active
    }
}

#[async_trait]
impl ChannelRepositoryTrait for InMemoryChannels {
    async fn create(&self, new_channel: NewChannel) -> Result<Channel> {
        let row = Channel {
            id: new_channel.id.unwrap_or_else(|| next_id("chn")),
            tenant_id: new_channel.tenant_id,
            kind: new_channel.kind,
            name: new_channel.name,
            external_instance_id: new_channel.external_instance_id,
            credentials_encrypted: new_channel.credentials_encrypted,
            webhook_secret: new_channel.webhook_secret,
            is_active: false,
            last_sync_at: None,
            created_at: now(),
        };
        self.rows.lock().unwrap().insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn delete(&self, channel_id: &str) -> Result<usize> {
        Ok(self.rows.lock().unwrap().remove(channel_id).map_or(0, |_| 1))
    }

    fn get_by_id(&self, channel_id: &str) -> Result<Channel> {
        self.rows
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| Error::Database(DatabaseError::NotFound(channel_id.to_string())))
    }

    fn find_for_webhook(
        &self,
        tenant_id: &str,
        kind: ChannelKind,
        external_instance_id: &str,
    ) -> Result<Option<Channel>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|c| {
                c.tenant_id == tenant_id
                    && c.kind == kind
                    && c.external_instance_id == external_instance_id
                    && c.is_active
            })
            .cloned())
    }

    fn list(&self, tenant_id: &str, is_active_filter: Option<bool>) -> Result<Vec<Channel>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && is_active_filter.map(|a| c.is_active == a).unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn set_active(&self, channel_id: &str, is_active: bool) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(channel_id)
            .ok_or_else(|| Error::Database(DatabaseError::NotFound(channel_id.to_string())))?;
        row.is_active = is_active;
        Ok(())
    }

    async fn touch_last_sync(&self, channel_id: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(channel_id) {
            row.last_sync_at = Some(now());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMappings {
    rows: Mutex<Vec<ProductChannelMapping>>,
}

impl InMemoryMappings {
    pub fn with(mappings: Vec<ProductChannelMapping>) -> Self {
        Self {
            rows: Mutex::new(mappings),
        }
    }
}

#[async_trait]
impl MappingRepositoryTrait for InMemoryMappings {
    async fn create(&self, new_mapping: NewMapping) -> Result<ProductChannelMapping> {
        let row = ProductChannelMapping {
            id: new_mapping.id.unwrap_or_else(|| next_id("map")),
            product_id: new_mapping.product_id,
            channel_id: new_mapping.channel_id,
            external_id: new_mapping.external_id,
            external_sku: new_mapping.external_sku,
            is_manual: new_mapping.is_manual,
            created_at: now(),
        };
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn delete(&self, mapping_id: &str) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|m| m.id != mapping_id);
        Ok(before - rows.len())
    }

    fn list_for_product(&self, product_id: &str) -> Result<Vec<ProductChannelMapping>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.product_id == product_id)
            .cloned()
            .collect())
    }

    fn list_for_channel(&self, channel_id: &str) -> Result<Vec<ProductChannelMapping>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect())
    }

    fn find_by_external_id(
        &self,
        channel_id: &str,
        external_id: &str,
    ) -> Result<Option<ProductChannelMapping>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.channel_id == channel_id && m.external_id == external_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemorySyncEvents {
    rows: Mutex<Vec<SyncEventRecord>>,
}

impl InMemorySyncEvents {
    pub fn all(&self) -> Vec<SyncEventRecord> {
        self.rows.lock().unwrap().clone()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<SyncEventRecord> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SyncEventRepositoryTrait for InMemorySyncEvents {
    async fn append(&self, event: NewSyncEvent) -> Result<SyncEventRecord> {
        let row = SyncEventRecord {
            id: next_id("evt"),
            tenant_id: event.tenant_id,
            event_type: event.event_type,
            channel_id: event.channel_id,
            product_id: event.product_id,
            old_value: event.old_value,
            new_value: event.new_value,
            status: event.status,
            error_message: event.error_message,
            created_at: now(),
        };
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    fn list_recent(&self, tenant_id: &str, limit: i64) -> Result<Vec<SyncEventRecord>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn has_open_event(
        &self,
        product_id: &str,
        channel_id: &str,
        event_type: &str,
    ) -> Result<bool> {
        Ok(self.rows.lock().unwrap().iter().any(|e| {
            e.product_id.as_deref() == Some(product_id)
                && e.channel_id.as_deref() == Some(channel_id)
                && e.event_type == event_type
                && e.status.is_open()
        }))
    }

    async fn prune_older_than(&self, _tenant_id: &str, _max_age_secs: u64) -> Result<usize> {
        Ok(0)
    }
}

#[derive(Default)]
pub struct InMemoryAlerts {
    alerts: Mutex<Vec<Alert>>,
    rules: Mutex<Vec<AlertRule>>,
}

impl InMemoryAlerts {
    pub fn with_rules(rules: Vec<AlertRule>) -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            rules: Mutex::new(rules),
        }
    }

    pub fn all(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertRepositoryTrait for InMemoryAlerts {
    async fn create(&self, new_alert: NewAlert) -> Result<Alert> {
        let row = Alert {
            id: next_id("alt"),
            tenant_id: new_alert.tenant_id,
            kind: new_alert.kind,
            severity: new_alert.severity,
            message: new_alert.message,
            metadata: new_alert.metadata,
            is_read: false,
            created_at: now(),
        };
        self.alerts.lock().unwrap().push(row.clone());
        Ok(row)
    }

    fn list_unread(&self, tenant_id: &str) -> Result<Vec<Alert>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.tenant_id == tenant_id && !a.is_read)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, alert_id: &str) -> Result<()> {
        let mut alerts = self.alerts.lock().unwrap();
        if let Some(alert) = alerts.iter_mut().find(|a| a.id == alert_id) {
            alert.is_read = true;
        }
        Ok(())
    }

    async fn prune_older_than(&self, _tenant_id: &str, _max_age_secs: u64) -> Result<usize> {
        Ok(0)
    }

    fn list_active_rules(&self, tenant_id: &str) -> Result<Vec<AlertRule>> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.is_active)
            .cloned()
            .collect())
    }
}

// ============================================================================
// In-memory job queue
// ============================================================================

/// A queue fake with real claim/retry semantics, minus durability.
#[derive(Default)]
pub struct InMemoryQueue {
    jobs: Mutex<Vec<crate::queue::JobRecord>>,
}

impl InMemoryQueue {
    pub fn jobs(&self) -> Vec<crate::queue::JobRecord> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn depth_of(&self, tenant_id: &str, queue: crate::queue::QueueName) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| {
                j.tenant_id == tenant_id
                    && j.queue == queue
                    && j.status == crate::queue::JobStatus::Waiting
            })
            .count()
    }
}

#[async_trait]
impl crate::queue::JobQueue for InMemoryQueue {
    async fn enqueue(
        &self,
        tenant_id: &str,
        queue: crate::queue::QueueName,
        name: &str,
        data: serde_json::Value,
        options: crate::queue::JobOptions,
    ) -> Result<crate::queue::JobRecord> {
        let mut jobs = self.jobs.lock().unwrap();

        if let Some(ref custom_id) = options.job_id {
            if let Some(existing) = jobs
                .iter()
                .find(|j| j.queue == queue && j.id == *custom_id)
            {
                return Ok(existing.clone());
            }
        }

        let record = crate::queue::JobRecord {
            id: options.job_id.unwrap_or_else(|| next_id("job")),
            tenant_id: tenant_id.to_string(),
            queue,
            name: name.to_string(),
            data,
            status: crate::queue::JobStatus::Waiting,
            priority: options.priority,
            attempts_made: 0,
            max_attempts: options.max_attempts,
            backoff_delay_ms: options.backoff_delay_ms,
            run_at: now() + chrono::Duration::milliseconds(options.delay_ms as i64),
            last_error: None,
            created_at: now(),
        };
        jobs.push(record.clone());
        Ok(record)
    }

    async fn fetch_next(
        &self,
        tenant_id: &str,
        queue: crate::queue::QueueName,
    ) -> Result<Option<crate::queue::JobRecord>> {
        let mut jobs = self.jobs.lock().unwrap();
        let now = now();

        let mut candidate: Option<usize> = None;
        for (index, job) in jobs.iter().enumerate() {
            if job.tenant_id != tenant_id
                || job.queue != queue
                || job.status != crate::queue::JobStatus::Waiting
                || job.run_at > now
            {
                continue;
            }
            match candidate {
                None => candidate = Some(index),
                Some(best) => {
                    let b = &jobs[best];
                    if (job.priority, job.run_at) < (b.priority, b.run_at) {
                        candidate = Some(index);
                    }
                }
            }
        }

        Ok(candidate.map(|index| {
            let job = &mut jobs[index];
            job.status = crate::queue::JobStatus::Active;
            job.attempts_made += 1;
            job.clone()
        }))
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = crate::queue::JobStatus::Completed;
        }
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: &str) -> Result<crate::queue::JobRecord> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| Error::Queue(format!("unknown job {}", job_id)))?;

        job.last_error = Some(error.to_string());
        if job.attempts_made >= job.max_attempts {
            job.status = crate::queue::JobStatus::Dead;
        } else {
            let backoff =
                job.backoff_delay_ms.saturating_mul(1 << (job.attempts_made - 1).min(31));
            job.status = crate::queue::JobStatus::Waiting;
            job.run_at = now() + chrono::Duration::milliseconds(backoff as i64);
        }
        Ok(job.clone())
    }

    async fn recover_stale(&self, tenant_id: &str) -> Result<usize> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut recovered = 0;
        for job in jobs.iter_mut() {
            if job.tenant_id == tenant_id && job.status == crate::queue::JobStatus::Active {
                job.status = crate::queue::JobStatus::Waiting;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    fn depth(
        &self,
        tenant_id: &str,
        queue: crate::queue::QueueName,
    ) -> Result<crate::queue::QueueDepth> {
        let jobs = self.jobs.lock().unwrap();
        let mut depth = crate::queue::QueueDepth::default();
        for job in jobs.iter().filter(|j| j.tenant_id == tenant_id && j.queue == queue) {
            match job.status {
                crate::queue::JobStatus::Waiting => depth.waiting += 1,
                crate::queue::JobStatus::Active => depth.active += 1,
                crate::queue::JobStatus::Failed => depth.failed += 1,
                crate::queue::JobStatus::Dead => depth.dead += 1,
                crate::queue::JobStatus::Completed => {}
            }
        }
        Ok(depth)
    }

    async fn prune(&self, tenant_id: &str) -> Result<usize> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| {
            !(j.tenant_id == tenant_id && j.status == crate::queue::JobStatus::Completed)
        });
        Ok(before - jobs.len())
    }
}

// ============================================================================
// Scripted channel provider
// ============================================================================

/// A provider whose reads and writes hit an in-memory stock table.
///
/// `fail_writes` makes the next N `set_stock` calls fail with the given
/// error factory, for retry and failure-path tests.
pub struct ScriptedProvider {
    id: &'static str,
    kind: ChannelKind,
    pub stock: Mutex<HashMap<String, i64>>,
    pub writes: Mutex<Vec<(String, i64)>>,
    fail_writes: AtomicU32,
    error_factory: Mutex<fn() -> ChannelError>,
    pub healthy: std::sync::atomic::AtomicBool,
}

impl ScriptedProvider {
    pub fn new(kind: ChannelKind) -> Self {
        let id = match kind {
            ChannelKind::Pos => "SCRIPTED_POS",
            ChannelKind::OnlineStore => "SCRIPTED_STORE",
            ChannelKind::DeliveryMarketplace => "SCRIPTED_MARKET",
        };
        Self {
            id,
            kind,
            stock: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            fail_writes: AtomicU32::new(0),
            error_factory: Mutex::new(|| ChannelError::Transient {
                provider: "SCRIPTED".to_string(),
                message: "scripted failure".to_string(),
            }),
            healthy: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn with_stock(self, external_id: &str, quantity: i64) -> Self {
        self.stock
            .lock()
            .unwrap()
            .insert(external_id.to_string(), quantity);
        self
    }

    pub fn fail_next_writes(&self, count: u32, factory: fn() -> ChannelError) {
        self.fail_writes.store(count, Ordering::SeqCst);
        *self.error_factory.lock().unwrap() = factory;
    }

    pub fn quantity_of(&self, external_id: &str) -> Option<i64> {
        self.stock.lock().unwrap().get(external_id).copied()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelProvider for ScriptedProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            tracks_quantity: true,
            supports_webhooks: true,
            supports_batch_writes: false,
            webhook_algorithm: SignatureAlgorithm::Sha256,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60_000,
            max_concurrency: 10,
            operation_timeout: std::time::Duration::from_secs(5),
        }
    }

    async fn connect(&self, _credentials: &ChannelCredentials) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    async fn disconnect(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    async fn list_products(&self) -> std::result::Result<Vec<ChannelItem>, ChannelError> {
        Ok(self
            .stock
            .lock()
            .unwrap()
            .iter()
            .map(|(external_id, quantity)| ChannelItem {
                external_id: external_id.clone(),
                sku: None,
                name: external_id.clone(),
                price: None,
                currency: None,
                quantity: *quantity,
                is_tracked: true,
                is_available: *quantity > 0,
                updated_at: None,
            })
            .collect())
    }

    async fn get_product(&self, external_id: &str) -> std::result::Result<Option<ChannelItem>, ChannelError> {
        Ok(self.quantity_of(external_id).map(|quantity| ChannelItem {
            external_id: external_id.to_string(),
            sku: None,
            name: external_id.to_string(),
            price: None,
            currency: None,
            quantity,
            is_tracked: true,
            is_available: quantity > 0,
            updated_at: None,
        }))
    }

    async fn set_stock(&self, external_id: &str, quantity: i64) -> std::result::Result<(), ChannelError> {
        if self.fail_writes.load(Ordering::SeqCst) > 0 {
            self.fail_writes.fetch_sub(1, Ordering::SeqCst);
            return Err((self.error_factory.lock().unwrap())());
        }
        self.stock
            .lock()
            .unwrap()
            .insert(external_id.to_string(), quantity);
        self.writes
            .lock()
            .unwrap()
            .push((external_id.to_string(), quantity));
        Ok(())
    }

    fn parse_webhook(&self, _raw: &[u8]) -> std::result::Result<Vec<WebhookStockChange>, ChannelError> {
        Ok(Vec::new())
    }

    async fn subscribe_webhook(
        &self,
        _url: &str,
        _events: &[String],
    ) -> std::result::Result<String, ChannelError> {
        Ok("scripted-sub".to_string())
    }

    async fn unsubscribe_webhook(&self, _subscription_id: &str) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if self.healthy.load(Ordering::SeqCst) {
            HealthStatus::healthy(1)
        } else {
            HealthStatus::unhealthy(1, "scripted outage")
        }
    }
}
