//! Configuration for the ingest engine and the storage backend.
//!
//! Configuration follows the usual precedence: explicit values win over the
//! built-in defaults below; the database location alone is taken from the
//! environment (`DB_CONNECTION`).

use serde::{Deserialize, Serialize};

use crate::error::{EdgelineError, Result};

/// Maximum latency between queue drains in milliseconds.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;

/// Queue length at which a drain is triggered eagerly.
pub const DEFAULT_QUEUE_THRESHOLD: usize = 100;

/// Environment variable naming the SQLite database path.
pub const DB_CONNECTION_ENV: &str = "DB_CONNECTION";

/// Database file used when `DB_CONNECTION` is not set.
pub const DEFAULT_DB_PATH: &str = "foglamp.db";

/// Configuration for one ingest engine instance.
///
/// `timeout_ms` bounds the latency between drains: an idle queue is still
/// flushed once per timeout. `threshold` triggers an eager drain as soon as
/// that many readings are queued. `requeue_on_failure` selects what happens
/// to a batch the storage layer rejects: buffer it at the front of the queue
/// for the next drain (default), or count it as discarded and drop it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Name of the service this engine ingests for.
    pub service_name: String,
    /// Name of the source plugin producing the readings.
    pub plugin_name: String,
    /// Maximum time between drains, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Queue length at which a drain is triggered eagerly.
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    /// Requeue a failed batch instead of discarding it.
    #[serde(default = "default_requeue")]
    pub requeue_on_failure: bool,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_DRAIN_TIMEOUT_MS
}

fn default_threshold() -> usize {
    DEFAULT_QUEUE_THRESHOLD
}

fn default_requeue() -> bool {
    true
}

impl IngestConfig {
    /// Create a configuration with the default queue tuning.
    pub fn new(service_name: impl Into<String>, plugin_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            plugin_name: plugin_name.into(),
            timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            threshold: DEFAULT_QUEUE_THRESHOLD,
            requeue_on_failure: true,
        }
    }

    /// Validate the configuration before the engine starts.
    pub fn validate(&self) -> Result<()> {
        if self.service_name.is_empty() {
            return Err(EdgelineError::Config("service_name must not be empty".into()));
        }
        if self.plugin_name.is_empty() {
            return Err(EdgelineError::Config("plugin_name must not be empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(EdgelineError::Config("timeout_ms must be positive".into()));
        }
        if self.threshold == 0 {
            return Err(EdgelineError::Config("threshold must be positive".into()));
        }
        Ok(())
    }
}

/// Resolve the SQLite database path from the environment.
///
/// `DB_CONNECTION` selects the connection string; absence means
/// [`DEFAULT_DB_PATH`].
pub fn database_path() -> String {
    std::env::var(DB_CONNECTION_ENV).unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
}
