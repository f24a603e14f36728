//! Opaque per-filter state persisted through the storage layer.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::sql::query::{InsertValues, QueryPayload, WhereClause};
use crate::storage::client::StorageClient;

/// The persistence channel filters serialize opaque state through.
///
/// State lives in the `plugin_data` table, keyed by service name plus filter
/// name. Blobs are stored as JSON when they parse, as plain strings
/// otherwise; [`load`](Self::load) hands back the textual form either way.
pub struct PluginData {
    storage: Arc<dyn StorageClient>,
}

impl PluginData {
    pub fn new(storage: Arc<dyn StorageClient>) -> Self {
        Self { storage }
    }

    /// Load the stored blob for `key`; an absent row or a failed query
    /// yields an empty JSON object.
    pub fn load(&self, key: &str) -> String {
        let payload = QueryPayload::with_where(WhereClause::equals("key", key));
        match self.storage.query_table("plugin_data", &payload) {
            Ok(doc) => doc
                .rows
                .first()
                .and_then(|row| row.get("data"))
                .map(|data| match data {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "{}".to_string()),
            Err(e) => {
                warn!(key, error = %e, "failed to load plugin data");
                "{}".to_string()
            }
        }
    }

    /// Replace the stored blob for `key`.
    pub fn persist(&self, key: &str, data: &str) -> Result<()> {
        let _ = self
            .storage
            .delete_table("plugin_data", &WhereClause::equals("key", key));

        let mut values = InsertValues::new();
        values.push("key", key);
        match serde_json::from_str::<Value>(data) {
            Ok(parsed) => values.push("data", parsed),
            Err(_) => values.push("data", data),
        }
        self.storage.insert_table("plugin_data", &values)
    }
}
