//! The ingest engine and its collaborators: the double-buffered reading
//! queue with its drain thread, the asset-tracking cache, and the
//! background statistics aggregator.

pub mod engine;
pub mod stats;
pub mod tracker;

pub use engine::IngestEngine;
pub use stats::StatsCollector;
pub use tracker::AssetTracker;
