//! Webhook intake pipeline.
//!
//! Turns raw vendor webhooks into normalized stock-change jobs on the
//! tenant's `webhook` queue. The HTTP boundary (external to this runtime)
//! maps [`WebhookOutcome`] onto response codes: `Accepted`/`Dropped` → 200,
//! `BadPayload` → 400, `BadSignature` → 401. Internal failures never bubble
//! into a 5xx; the vendor must not be provoked into a retry storm.

use std::sync::Arc;

use log::{debug, warn};
use stockclerk_channels::provider::provider_for;
use stockclerk_channels::{signature, ChannelKind, SignatureAlgorithm};

use crate::channels::ChannelRepositoryTrait;
use crate::errors::Result;
use crate::queue::{JobOptions, JobQueue, QueueName};
use crate::sync::jobs::{self, StockChangedJob};

/// Priority for webhook-originated jobs (lower = sooner).
const WEBHOOK_PRIORITY: i32 = 1;

/// What the HTTP boundary should tell the vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Jobs enqueued (possibly zero for non-stock events).
    Accepted { jobs_enqueued: usize },
    /// Unknown channel or unusable payload; swallowed with a 200 so the
    /// vendor does not retry.
    Dropped { reason: String },
    /// Body was not valid JSON.
    BadPayload,
    /// Signature missing or failed verification.
    BadSignature,
}

/// A webhook as delivered by the HTTP boundary.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub channel_kind: ChannelKind,
    pub body: Vec<u8>,
    pub signature: Option<String>,
    /// The vendor's account/shop identifier from the routing header.
    pub external_instance_id: String,
}

/// The watcher's webhook half: validates, normalizes, enqueues.
pub struct WebhookPipeline {
    tenant_id: String,
    channels: Arc<dyn ChannelRepositoryTrait>,
    queue: Arc<dyn JobQueue>,
}

impl WebhookPipeline {
    pub fn new(
        tenant_id: String,
        channels: Arc<dyn ChannelRepositoryTrait>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            tenant_id,
            channels,
            queue,
        }
    }

    /// Run the full intake pipeline for one delivery.
    pub async fn handle(&self, delivery: WebhookDelivery) -> Result<WebhookOutcome> {
        // 1. The body must at least be JSON; vendors get a 400 otherwise.
        if serde_json::from_slice::<serde_json::Value>(&delivery.body).is_err() {
            return Ok(WebhookOutcome::BadPayload);
        }

        // 2. Resolve the channel. Unknown senders are swallowed.
        let Some(channel) = self.channels.find_for_webhook(
            &self.tenant_id,
            delivery.channel_kind,
            &delivery.external_instance_id,
        )?
        else {
            debug!(
                "Webhook for unknown {} instance '{}', dropping",
                delivery.channel_kind, delivery.external_instance_id
            );
            return Ok(WebhookOutcome::Dropped {
                reason: "unknown channel".to_string(),
            });
        };

        // 3. Verify the signature when the channel has a secret.
        if let Some(ref secret) = channel.webhook_secret {
            let algorithm = webhook_algorithm(channel.kind);
            let verified = delivery
                .signature
                .as_deref()
                .map(|header| signature::verify(algorithm, secret, &delivery.body, header))
                .unwrap_or(false);
            if !verified {
                warn!(
                    "Webhook signature failure for channel {} ({})",
                    channel.id, channel.kind
                );
                return Ok(WebhookOutcome::BadSignature);
            }
        }

        // 4. Normalize through the provider's parser.
        let changes = match provider_for(channel.kind).parse_webhook(&delivery.body) {
            Ok(changes) => changes,
            Err(e) => {
                warn!("Webhook for channel {} refused by parser: {}", channel.id, e);
                return Ok(WebhookOutcome::Dropped {
                    reason: e.to_string(),
                });
            }
        };

        // 5. Enqueue one elevated-priority job per normalized change, keyed
        // for idempotency so vendor redeliveries collapse.
        let mut enqueued = 0usize;
        for change in changes {
            let idempotency_key = format!(
                "{}:{}:{}",
                channel.id, change.product_external_id, change.source_stamp
            );
            let payload = StockChangedJob {
                channel_id: channel.id.clone(),
                external_id: change.product_external_id,
                previous_quantity: change.previous_quantity,
                new_quantity: change.new_quantity,
                is_available: change.is_available,
                reason: change.reason,
                idempotency_key: idempotency_key.clone(),
            };

            self.queue
                .enqueue(
                    &self.tenant_id,
                    QueueName::Webhook,
                    jobs::names::STOCK_CHANGED,
                    serde_json::to_value(&payload)?,
                    JobOptions::for_queue(QueueName::Webhook)
                        .with_priority(WEBHOOK_PRIORITY)
                        .with_job_id(idempotency_key),
                )
                .await?;
            enqueued += 1;
        }

        Ok(WebhookOutcome::Accepted {
            jobs_enqueued: enqueued,
        })
    }
}

/// The HMAC algorithm each channel kind signs with.
pub fn webhook_algorithm(kind: ChannelKind) -> SignatureAlgorithm {
    match kind {
        ChannelKind::Pos | ChannelKind::OnlineStore => SignatureAlgorithm::Sha256,
        ChannelKind::DeliveryMarketplace => SignatureAlgorithm::Sha1,
    }
}
