//! Adapter construction settings.

use crate::db::DEFAULT_TABLE_NAME;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_DRIVER: &str = "sqlite";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Settings accepted by `ContextAdapter::from_config`.
///
/// Only `dsn` is required when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterConfig {
    #[serde(default = "default_driver")]
    pub driver: String,
    /// File path, `sqlite://<path>`, or `:memory:`.
    pub dsn: String,
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default)]
    pub table_prefix: String,
    /// How long SQLite waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl AdapterConfig {
    pub fn new(driver: impl Into<String>, dsn: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            dsn: dsn.into(),
            table_name: default_table_name(),
            table_prefix: String::new(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Parses a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
