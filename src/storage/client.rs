//! The storage-client contract consumed by the ingest engine.

use crate::error::Result;
use crate::model::Reading;
use crate::sql::query::{ExpressionValues, InsertValues, QueryPayload, WhereClause};
use crate::storage::result_map::ResultDocument;

/// The storage operations the ingest engine depends on.
///
/// [`crate::storage::SqliteStorage`] is the production implementation; tests
/// substitute stubs to drive failure paths. Implementations must be
/// internally thread-safe: only the drain thread appends readings, but the
/// statistics thread queries and updates concurrently.
pub trait StorageClient: Send + Sync {
    /// Run the query described by `payload` against `table`.
    fn query_table(&self, table: &str, payload: &QueryPayload) -> Result<ResultDocument>;

    /// Insert one row of column/value pairs.
    fn insert_table(&self, table: &str, values: &InsertValues) -> Result<()>;

    /// Apply a batch of expression updates atomically; returns the total
    /// number of affected rows.
    fn update_table(&self, table: &str, updates: &[(ExpressionValues, WhereClause)])
        -> Result<i64>;

    /// Delete the rows matching `condition`; returns the number removed.
    fn delete_table(&self, table: &str, condition: &WhereClause) -> Result<i64>;

    /// Append a batch of readings. Atomic per batch: on error no reading
    /// from the batch is stored.
    fn reading_append(&self, readings: &[Reading]) -> Result<()>;
}
