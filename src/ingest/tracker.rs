//! In-memory asset-tracking cache with pass-through registration.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::management::ManagementClient;
use crate::model::{AssetTrackingTuple, INGEST_EVENT};

/// Cache of the asset-tracking tuples observed this session.
///
/// The cache is a superset of the management-side tuples for this service's
/// plugin and the `Ingest` event. Registration goes through the management
/// collaborator first; a tuple enters the cache only once the registration
/// succeeded.
pub struct AssetTracker {
    management: Arc<dyn ManagementClient>,
    service_name: String,
    plugin_name: String,
    cache: Mutex<HashSet<AssetTrackingTuple>>,
}

impl AssetTracker {
    pub fn new(
        management: Arc<dyn ManagementClient>,
        service_name: impl Into<String>,
        plugin_name: impl Into<String>,
    ) -> Self {
        Self {
            management,
            service_name: service_name.into(),
            plugin_name: plugin_name.into(),
            cache: Mutex::new(HashSet::new()),
        }
    }

    /// Prime the cache from the management plane.
    ///
    /// Tuples registered under another plugin or event are dropped with an
    /// info log. A fetch failure leaves the cache empty; the service
    /// continues and re-registers assets as they are observed.
    pub fn populate(&self) {
        match self.management.get_asset_tracking_tuples(&self.service_name) {
            Ok(tuples) => {
                let mut cache = self.cache.lock();
                for tuple in tuples {
                    if tuple.plugin != self.plugin_name || tuple.event != INGEST_EVENT {
                        info!(%tuple, "plugin/event mismatch, not caching asset tracking tuple");
                        continue;
                    }
                    cache.insert(tuple);
                }
            }
            Err(e) => error!(error = %e, "failed to populate asset tracking cache"),
        }
    }

    /// Whether the tuple has been observed this session.
    pub fn check(&self, tuple: &AssetTrackingTuple) -> bool {
        self.cache.lock().contains(tuple)
    }

    /// Register a tuple. Idempotent: a cache hit is a no-op; a miss first
    /// registers through the management plane and caches only on success.
    pub fn register(&self, tuple: AssetTrackingTuple) {
        if self.check(&tuple) {
            debug!(%tuple, "tuple already cached, not registering again");
            return;
        }
        match self.management.add_asset_tracking_tuple(
            &tuple.service,
            &tuple.plugin,
            &tuple.asset,
            &tuple.event,
        ) {
            Ok(true) => {
                info!(%tuple, "registered new asset tracking tuple");
                self.cache.lock().insert(tuple);
            }
            Ok(false) => info!(%tuple, "asset tracking registration was not accepted"),
            Err(e) => error!(%tuple, error = %e, "asset tracking registration failed"),
        }
    }
}
