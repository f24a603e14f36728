#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Edgeline
//!
//! Edgeline is the core of an industrial edge-data ingest service. It accepts
//! time-stamped sensor readings from a source plugin, streams them through an
//! ordered pipeline of transformation filters, and durably appends them to a
//! SQLite storage backend while maintaining asset-tracking metadata and
//! per-asset ingest statistics.
//!
//! ## Architecture
//!
//! - **Ingest engine** ([`IngestEngine`]) — a double-buffered reading queue
//!   with a batching drain thread, a pluggable filter pipeline, and a
//!   background statistics aggregator. Producers only ever block for the
//!   duration of a queue append; storage latency is absorbed by the drain
//!   thread.
//! - **Storage translator** ([`sql::translator`]) — a stateless translator
//!   from a declarative JSON query language (aggregates, projections,
//!   predicates, ordering, limits, grouping, JSON-path accessors) into SQL,
//!   together with the inverse mapping from a row set to a canonical JSON
//!   result document and an age-and-watermark-based purge operation.
//!
//! The process supervisor, the HTTP management plane, and concrete filter
//! implementations are external collaborators; only the contracts the core
//! consumes ([`ManagementClient`], [`Filter`], [`StorageClient`]) are defined
//! here.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use edgeline::{IngestConfig, IngestEngine, Reading, SqliteStorage};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(SqliteStorage::open_default()?);
//! let config = IngestConfig::new("sine-service", "sinusoid");
//! let mut engine = IngestEngine::start(config, storage, management, Vec::new())?;
//!
//! engine.ingest(Reading::new("sinusoid", json!({"value": 0.5})));
//! // ... readings are drained to storage in batches ...
//! engine.shutdown();
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod management;
pub mod model;
pub mod sql;
pub mod storage;

pub use config::IngestConfig;
pub use error::{EdgelineError, Result};
pub use filter::{Filter, FilterOutput, FilterPipeline};
pub use ingest::IngestEngine;
pub use management::{ConfigCategory, ManagementClient};
pub use model::{AssetTrackingTuple, Reading, ReadingSet};
pub use storage::{PurgeReport, ResultDocument, SqliteStorage, StorageClient};
