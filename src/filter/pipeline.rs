//! Filter trait and pipeline wiring.
//!
//! A filter is a value with a fixed capability set: `init`, `ingest`,
//! `reconfigure`, `shutdown`, and the optional persistence hooks
//! `persist_data`/`start_data`. Transport between stages is the
//! [`FilterOutput`] forwarding seam, bound at pipeline-build time: a filter
//! receives ownership of the [`ReadingSet`] and must either forward a set
//! downstream or consume it. Dropping readings, mutating in place, and
//! substituting an entirely new set are all treated uniformly.
//!
//! Filter callbacks execute on the engine's drain thread.

use std::collections::HashMap;

use tracing::{debug, error, info};

use crate::error::{EdgelineError, Result};
use crate::management::{ConfigCategory, ManagementClient};
use crate::model::ReadingSet;
use crate::storage::PluginData;

/// A loadable transformation stage.
pub trait Filter: Send {
    /// The filter's name; doubles as its configuration category name.
    fn name(&self) -> &str;

    /// Called once at pipeline build time with the filter's up-to-date
    /// configuration.
    fn init(&mut self, config: &ConfigCategory) -> Result<()>;

    /// Process one batch. The filter must either forward a set through
    /// `output` or consume the batch entirely.
    fn ingest(&mut self, set: ReadingSet, output: &mut dyn FilterOutput);

    /// New configuration delivered for this filter's category.
    fn reconfigure(&mut self, config: &str);

    /// Whether this filter persists opaque state across restarts.
    fn persist_data(&self) -> bool {
        false
    }

    /// Hand the filter its last persisted blob (persisting filters only).
    fn start_data(&mut self, _data: &str) {}

    /// Shut down; a persisting filter returns the blob to store.
    fn shutdown(&mut self) -> Option<String> {
        None
    }
}

/// The downstream seam a filter forwards its output through.
pub trait FilterOutput {
    fn send(&mut self, set: ReadingSet);
}

/// Captures whatever the filter forwarded, for handoff to the next stage.
struct Capture(Option<ReadingSet>);

impl FilterOutput for Capture {
    fn send(&mut self, set: ReadingSet) {
        self.0 = Some(set);
    }
}

/// An ordered chain of filters bound between the ingest queue and storage.
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
    categories: HashMap<String, usize>,
    plugin_data: Option<PluginData>,
    service_name: String,
}

impl FilterPipeline {
    /// A pipeline with no stages; batches pass through untouched.
    pub fn empty() -> Self {
        Self {
            filters: Vec::new(),
            categories: HashMap::new(),
            plugin_data: None,
            service_name: String::new(),
        }
    }

    /// Build the pipeline by walking the filters front-to-back: fetch each
    /// filter's current configuration, attach its category under the
    /// service, initialize it, and restore persisted state where declared.
    ///
    /// An init failure tears down the already-initialized prefix and fails
    /// the build; the service must refuse to start.
    pub fn build(
        filters: Vec<Box<dyn Filter>>,
        management: &dyn ManagementClient,
        service_name: &str,
        plugin_data: Option<PluginData>,
    ) -> Result<Self> {
        let mut pipeline = Self {
            filters: Vec::with_capacity(filters.len()),
            categories: HashMap::new(),
            plugin_data,
            service_name: service_name.to_string(),
        };

        for mut filter in filters {
            let category_name = filter.name().to_string();
            let config = match management.get_category(&category_name) {
                Ok(config) => config,
                Err(e) => {
                    pipeline.shutdown();
                    return Err(EdgelineError::Management(format!(
                        "failed to fetch category '{category_name}': {e}"
                    )));
                }
            };
            if let Err(e) = management.add_child_categories(service_name, &[category_name.clone()])
            {
                pipeline.shutdown();
                return Err(EdgelineError::Management(format!(
                    "failed to attach category '{category_name}': {e}"
                )));
            }

            if let Err(e) = filter.init(&config) {
                error!(filter = %category_name, error = %e, "filter init failed");
                pipeline.shutdown();
                return Err(EdgelineError::Filter(format!(
                    "init failed for filter '{category_name}': {e}"
                )));
            }

            if filter.persist_data() {
                if let Some(plugin_data) = &pipeline.plugin_data {
                    let blob = plugin_data.load(&pipeline.storage_key(&category_name));
                    filter.start_data(&blob);
                }
            }

            pipeline
                .categories
                .insert(category_name, pipeline.filters.len());
            pipeline.filters.push(filter);
        }

        Ok(pipeline)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Run one batch through the chain. Returns the surviving set; empty
    /// when a stage consumed the batch without forwarding.
    pub fn process(&mut self, set: ReadingSet) -> ReadingSet {
        let mut current = set;
        for filter in &mut self.filters {
            let mut capture = Capture(None);
            filter.ingest(current, &mut capture);
            match capture.0 {
                Some(next) => current = next,
                None => {
                    debug!(filter = %filter.name(), "filter consumed the batch");
                    return ReadingSet::empty();
                }
            }
        }
        current
    }

    /// Route a configuration change to the filter owning `category`.
    pub fn config_change(&mut self, category: &str, config: &str) {
        match self.categories.get(category) {
            Some(&index) => {
                info!(category, "reconfiguring filter");
                self.filters[index].reconfigure(config);
            }
            None => debug!(category, "configuration change for unknown category"),
        }
    }

    /// Shut every filter down front-to-back, persisting declared state.
    pub fn shutdown(&mut self) {
        for filter in &mut self.filters {
            let persists = filter.persist_data();
            let name = filter.name().to_string();
            let blob = filter.shutdown();
            if persists {
                if let (Some(blob), Some(plugin_data)) = (blob, &self.plugin_data) {
                    let key = format!("{}{}", self.service_name, name);
                    if let Err(e) = plugin_data.persist(&key, &blob) {
                        error!(filter = %name, error = %e, "failed to persist filter data");
                    }
                }
            }
        }
        self.filters.clear();
        self.categories.clear();
    }

    fn storage_key(&self, filter_name: &str) -> String {
        format!("{}{}", self.service_name, filter_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Reading;
    use serde_json::json;

    /// Scales every numeric `value` member by a factor.
    struct ScaleFilter {
        factor: f64,
    }

    impl Filter for ScaleFilter {
        fn name(&self) -> &str {
            "scale"
        }

        fn init(&mut self, _config: &ConfigCategory) -> Result<()> {
            Ok(())
        }

        fn ingest(&mut self, mut set: ReadingSet, output: &mut dyn FilterOutput) {
            for reading in set.readings_mut() {
                if let Some(v) = reading.reading.get("value").and_then(|v| v.as_f64()) {
                    reading.reading["value"] = json!(v * self.factor);
                }
            }
            output.send(set);
        }

        fn reconfigure(&mut self, config: &str) {
            if let Ok(v) = serde_json::from_str::<serde_json::Value>(config) {
                if let Some(factor) = v.get("factor").and_then(|f| f.as_f64()) {
                    self.factor = factor;
                }
            }
        }
    }

    /// Consumes every batch without forwarding.
    struct SinkFilter;

    impl Filter for SinkFilter {
        fn name(&self) -> &str {
            "sink"
        }

        fn init(&mut self, _config: &ConfigCategory) -> Result<()> {
            Ok(())
        }

        fn ingest(&mut self, set: ReadingSet, _output: &mut dyn FilterOutput) {
            drop(set);
        }

        fn reconfigure(&mut self, _config: &str) {}
    }

    fn pipeline_of(filters: Vec<Box<dyn Filter>>) -> FilterPipeline {
        let mut categories = HashMap::new();
        for (index, filter) in filters.iter().enumerate() {
            categories.insert(filter.name().to_string(), index);
        }
        FilterPipeline {
            filters,
            categories,
            plugin_data: None,
            service_name: "svc".to_string(),
        }
    }

    fn batch() -> ReadingSet {
        ReadingSet::new(vec![
            Reading::new("a", json!({"value": 2.0})),
            Reading::new("a", json!({"value": 3.0})),
        ])
    }

    #[test]
    fn test_chain_applies_in_order() {
        let mut pipeline = pipeline_of(vec![
            Box::new(ScaleFilter { factor: 2.0 }),
            Box::new(ScaleFilter { factor: 10.0 }),
        ]);
        let out = pipeline.process(batch());
        assert_eq!(out.readings()[0].reading["value"], json!(40.0));
        assert_eq!(out.readings()[1].reading["value"], json!(60.0));
    }

    #[test]
    fn test_consuming_filter_empties_the_batch() {
        let mut pipeline = pipeline_of(vec![
            Box::new(ScaleFilter { factor: 2.0 }),
            Box::new(SinkFilter),
        ]);
        let out = pipeline.process(batch());
        assert!(out.is_empty());
    }

    #[test]
    fn test_config_change_routed_by_category() {
        let mut pipeline = pipeline_of(vec![Box::new(ScaleFilter { factor: 1.0 })]);
        pipeline.config_change("scale", r#"{"factor": 5.0}"#);
        let out = pipeline.process(batch());
        assert_eq!(out.readings()[0].reading["value"], json!(10.0));

        // Unknown categories are ignored.
        pipeline.config_change("unknown", "{}");
    }

    #[test]
    fn test_empty_pipeline_passes_through() {
        let mut pipeline = FilterPipeline::empty();
        assert!(pipeline.is_empty());
        let out = pipeline.process(batch());
        assert_eq!(out.len(), 2);
    }
}
