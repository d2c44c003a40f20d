//! Parent/worker IPC.
//!
//! Messages are small, typed, one-way records carried as JSON lines over the
//! worker's stdin (parent to child) and stdout (child to parent). The
//! worker's own logging goes to stderr so stdout stays clean.
//!
//! Unknown message kinds deserialize into the `Unknown` variant and are
//! dropped silently, so either side can be upgraded first.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use stockclerk_core::events::StockEvent;
use stockclerk_core::settings::Settings;
use stockclerk_core::worker::{SyncScope, WorkerHealth};
use stockclerk_core::ChannelKind;

/// Messages the orchestrator sends to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParentMessage {
    /// First message after spawn: the worker's full configuration.
    Init { tenant_id: String, settings: Settings },
    /// Liveness probe; the worker answers with `Pong` carrying the same
    /// timestamp.
    Ping { ts: i64 },
    /// Stop. `graceful` drains in-flight jobs within the grace budget.
    Shutdown { graceful: bool },
    TriggerSync {
        #[serde(flatten)]
        scope: SyncScope,
    },
    AddWebhookJob {
        channel_kind: ChannelKind,
        external_instance_id: String,
        /// Raw body bytes, JSON-escaped as a string.
        payload: String,
        signature: Option<String>,
    },
    TriggerReconciliation { auto_repair: bool },
    /// Forward-compatibility catch-all; ignored.
    #[serde(other)]
    Unknown,
}

/// Messages a worker sends to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Bootstrap handshake: the worker is initialized and consuming.
    Ready { pid: u32 },
    Pong { ts: i64 },
    HealthReport { health: WorkerHealth },
    /// An error crossed the top of the worker's event loop. `fatal` means
    /// the worker is about to exit.
    ErrorReport { message: String, fatal: bool },
    /// Relayed bus event for orchestrator-level aggregation.
    SyncEvent { event: StockEvent },
    ShutdownComplete,
    /// Forward-compatibility catch-all; ignored.
    #[serde(other)]
    Unknown,
}

/// Write one message as a JSON line.
pub async fn write_message<W, M>(writer: &mut W, message: &M) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    M: Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

/// Parse one received line. `None` for blank lines and unparseable input
/// (a crashing worker can leave half a line behind).
pub fn parse_line<M: serde::de::DeserializeOwned>(line: &str) -> Option<M> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
