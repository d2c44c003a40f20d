//! The watcher: turns external stimuli (webhooks, timers) into normalized
//! stock-change intents on the local queues.


mod poller;
#[allow(clippy::module_inception)]
mod watcher;

pub use poller::PollPipeline;
pub use watcher::{webhook_algorithm, WebhookDelivery, WebhookOutcome, WebhookPipeline};
