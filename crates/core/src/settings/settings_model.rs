//! Environment-backed settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::errors::{Error, Result};

/// Runtime configuration for the sync runtime, read from the environment
/// once at startup and passed to every worker via the `init` IPC message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub database_url: String,
    /// Queue substrate URL. The SQLite substrate ignores it and uses
    /// `database_url`; kept for parity with deployments that point it at a
    /// dedicated store.
    pub queue_url: Option<String>,
    pub sync_interval_ms: u64,
    pub sync_batch_size: usize,
    pub sync_max_retries: u32,
    pub reconciliation_interval_ms: u64,
    pub drift_auto_repair_threshold_pct: f64,
    pub low_stock_threshold: i64,
    /// Key material for credential sealing; at least 32 characters.
    pub encryption_key: String,
    /// Soft heap bound for a worker process, in megabytes.
    pub max_heap_mb: u64,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// Only `DATABASE_URL` and `ENCRYPTION_KEY` are required; everything
    /// else falls back to documented defaults.
    pub fn from_env() -> Result<Self> {
        let database_url = require("DATABASE_URL")?;
        let encryption_key = require("ENCRYPTION_KEY")?;
        if encryption_key.len() < 32 {
            return Err(Error::InvalidConfigValue(
                "ENCRYPTION_KEY must be at least 32 characters".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            queue_url: std::env::var("REDIS_URL").ok(),
            sync_interval_ms: parse_or("SYNC_INTERVAL_MS", constants::DEFAULT_SYNC_INTERVAL_MS)?,
            sync_batch_size: parse_or("SYNC_BATCH_SIZE", constants::DEFAULT_SYNC_BATCH_SIZE)?,
            sync_max_retries: parse_or("SYNC_MAX_RETRIES", constants::DEFAULT_SYNC_MAX_RETRIES)?,
            reconciliation_interval_ms: parse_or(
                "RECONCILIATION_INTERVAL_MS",
                constants::DEFAULT_RECONCILIATION_INTERVAL_MS,
            )?,
            drift_auto_repair_threshold_pct: parse_or(
                "DRIFT_AUTO_REPAIR_THRESHOLD",
                constants::DEFAULT_DRIFT_AUTO_REPAIR_THRESHOLD_PCT,
            )?,
            low_stock_threshold: parse_or(
                "LOW_STOCK_THRESHOLD",
                constants::DEFAULT_LOW_STOCK_THRESHOLD,
            )?,
            encryption_key,
            max_heap_mb: parse_or("WORKER_MAX_HEAP_MB", 256)?,
        })
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_millis(self.reconciliation_interval_ms)
    }
}

fn require(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::ConfigIO(format!("{} is not set", key)))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| Error::InvalidConfigValue(format!("{}={}", key, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_in() {
        // Construct directly; from_env is exercised by the daemon.
        let settings = Settings {
            database_url: "stockclerk.db".to_string(),
            queue_url: None,
            sync_interval_ms: constants::DEFAULT_SYNC_INTERVAL_MS,
            sync_batch_size: constants::DEFAULT_SYNC_BATCH_SIZE,
            sync_max_retries: constants::DEFAULT_SYNC_MAX_RETRIES,
            reconciliation_interval_ms: constants::DEFAULT_RECONCILIATION_INTERVAL_MS,
            drift_auto_repair_threshold_pct: constants::DEFAULT_DRIFT_AUTO_REPAIR_THRESHOLD_PCT,
            low_stock_threshold: constants::DEFAULT_LOW_STOCK_THRESHOLD,
            encryption_key: "0123456789abcdef0123456789abcdef".to_string(),
            max_heap_mb: 256,
        };
        assert_eq!(settings.sync_interval(), Duration::from_secs(30));
        assert_eq!(settings.reconciliation_interval(), Duration::from_secs(900));
    }

    #[test]
    fn test_settings_round_trip_json() {
        let settings = Settings {
            database_url: "stockclerk.db".to_string(),
            queue_url: Some("redis://localhost".to_string()),
            sync_interval_ms: 1000,
            sync_batch_size: 10,
            sync_max_retries: 2,
            reconciliation_interval_ms: 5000,
            drift_auto_repair_threshold_pct: 5.0,
            low_stock_threshold: 3,
            encryption_key: "0123456789abcdef0123456789abcdef".to_string(),
            max_heap_mb: 128,
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sync_interval_ms, 1000);
        assert_eq!(back.queue_url.as_deref(), Some("redis://localhost"));
    }
}
