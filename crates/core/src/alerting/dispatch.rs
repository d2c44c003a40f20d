//! Alert delivery.
//!
//! Delivery is best-effort by contract: a failed notification never rolls
//! back the alert row, and errors are logged and dropped.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{info, warn};

use crate::alerts::RuleAction;
use crate::events::{EventSink, StockEvent};
use crate::sync::jobs::DispatchAlertJob;

/// Outbound email hookup. The runtime wires a real sender; the default
/// implementation only records the intent (email templating is owned by the
/// account surface, not this runtime).
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, recipients: &[String], subject: &str, body: &str);
}

/// Logs each email instead of sending it.
#[derive(Default)]
pub struct LoggingEmailSender;

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send(&self, recipients: &[String], subject: &str, _body: &str) {
        info!("Email '{}' to {} recipient(s)", subject, recipients.len());
    }
}

/// Collects emails for assertions.
#[derive(Clone, Default)]
pub struct MockEmailSender {
    pub sent: Arc<Mutex<Vec<(Vec<String>, String)>>>,
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, recipients: &[String], subject: &str, _body: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((recipients.to_vec(), subject.to_string()));
    }
}

/// Executes the actions attached to one dispatched alert.
pub struct AlertDispatcher {
    events: Arc<dyn EventSink>,
    email: Arc<dyn EmailSender>,
    http: reqwest::Client,
}

impl AlertDispatcher {
    pub fn new(events: Arc<dyn EventSink>, email: Arc<dyn EmailSender>) -> Self {
        Self {
            events,
            email,
            http: reqwest::Client::new(),
        }
    }

    /// Run every action. Individual failures are logged and skipped.
    pub async fn dispatch(&self, job: &DispatchAlertJob) {
        for action in &job.actions {
            match action {
                RuleAction::Notify => {
                    self.events.emit(StockEvent::AlertTriggered {
                        alert_id: job.alert_id.clone(),
                        kind: job.kind.clone(),
                        severity: job.severity.clone(),
                    });
                }
                RuleAction::Email { recipients } => {
                    let subject = format!("[stockclerk] {} alert", job.kind);
                    self.email.send(recipients, &subject, &job.message).await;
                }
                RuleAction::Webhook { url } => {
                    let payload = serde_json::json!({
                        "alertId": job.alert_id,
                        "kind": job.kind,
                        "severity": job.severity,
                        "message": job.message,
                    });
                    match self.http.post(url).json(&payload).send().await {
                        Ok(response) if !response.status().is_success() => {
                            warn!(
                                "Alert webhook to {} answered {}",
                                url,
                                response.status()
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Alert webhook to {} failed: {}", url, e),
                    }
                }
            }
        }
    }
}
