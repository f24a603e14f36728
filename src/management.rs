//! The management-plane contract consumed by the core.
//!
//! The concrete management client (an HTTP microservice API) is an external
//! collaborator; the core consumes only this trait. Tests substitute
//! in-memory implementations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::model::AssetTrackingTuple;

/// One configuration category: a named bag of configuration items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigCategory {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Category items as delivered by the management plane.
    #[serde(default)]
    pub values: Value,
}

impl ConfigCategory {
    pub fn new(name: impl Into<String>, values: Value) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            values,
        }
    }
}

/// Operations the core needs from the management plane.
pub trait ManagementClient: Send + Sync {
    /// All asset-tracking tuples registered for `service`.
    fn get_asset_tracking_tuples(&self, service: &str) -> Result<Vec<AssetTrackingTuple>>;

    /// Register one asset-tracking tuple; returns whether the registration
    /// was accepted.
    fn add_asset_tracking_tuple(
        &self,
        service: &str,
        plugin: &str,
        asset: &str,
        event: &str,
    ) -> Result<bool>;

    /// Fetch the up-to-date contents of a configuration category.
    fn get_category(&self, name: &str) -> Result<ConfigCategory>;

    /// Attach child categories under a parent category.
    fn add_child_categories(&self, parent: &str, children: &[String]) -> Result<()>;
}
