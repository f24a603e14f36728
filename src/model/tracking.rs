//! Asset-tracking tuple identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event name under which ingested assets are tracked.
pub const INGEST_EVENT: &str = "Ingest";

/// Identity of a (service, plugin, asset, event) relationship registered
/// with the management plane. Equality and hashing are componentwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetTrackingTuple {
    pub service: String,
    pub plugin: String,
    pub asset: String,
    pub event: String,
}

impl AssetTrackingTuple {
    pub fn new(
        service: impl Into<String>,
        plugin: impl Into<String>,
        asset: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            plugin: plugin.into(),
            asset: asset.into(),
            event: event.into(),
        }
    }

    /// Tuple for an asset observed during ingest.
    pub fn ingest(
        service: impl Into<String>,
        plugin: impl Into<String>,
        asset: impl Into<String>,
    ) -> Self {
        Self::new(service, plugin, asset, INGEST_EVENT)
    }
}

impl fmt::Display for AssetTrackingTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.service, self.plugin, self.asset, self.event
        )
    }
}
