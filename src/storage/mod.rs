//! Storage operations over the SQLite backend.
//!
//! This module is organized into submodules:
//! - `client` - the storage-client contract consumed by the ingest engine
//! - `sqlite` - the SQLite-backed implementation of the storage operations
//! - `result_map` - row set to canonical JSON document mapping
//! - `plugin_data` - the opaque persistence channel for filters

pub mod client;
pub mod plugin_data;
pub mod result_map;
pub mod sqlite;

pub use client::StorageClient;
pub use plugin_data::PluginData;
pub use result_map::ResultDocument;
pub use sqlite::{OperationError, PurgeReport, SqliteStorage};
