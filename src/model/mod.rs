//! Core value objects: readings, reading sets, and asset-tracking tuples.

mod reading;
mod tracking;

pub use reading::{Reading, ReadingSet};
pub use tracking::{AssetTrackingTuple, INGEST_EVENT};
