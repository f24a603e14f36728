//! SQLite-backed storage operations.
//!
//! One [`SqliteStorage`] owns one `rusqlite::Connection`; all access is
//! serialized through a `Mutex` because the connection is not `Sync`. The
//! generic table operations go through the JSON query language and the
//! translator; the readings-table operations (append, fetch, purge) are the
//! hot path and build their SQL directly.
//!
//! Failures are surfaced as `Err` to the caller and additionally recorded on
//! an out-of-band per-connection channel keyed by operation name, readable
//! through [`last_error`](SqliteStorage::last_error).

use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::database_path;
use crate::error::{EdgelineError, Result};
use crate::model::Reading;
use crate::sql::query::{ExpressionValues, InsertValues, QueryPayload, WhereClause};
use crate::sql::{translator, SqlBuffer};
use crate::storage::client::StorageClient;
use crate::storage::result_map::{map_result, ResultDocument};

/// Schema for the tables the core persists. Creation is idempotent.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS readings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_code TEXT NOT NULL,
    read_key TEXT,
    reading JSON,
    user_ts TIMESTAMP,
    ts TIMESTAMP DEFAULT (datetime('now'))
);
CREATE TABLE IF NOT EXISTS statistics (
    key TEXT PRIMARY KEY,
    description TEXT,
    value BIGINT DEFAULT 0,
    previous_value BIGINT DEFAULT 0
);
CREATE TABLE IF NOT EXISTS plugin_data (
    key TEXT PRIMARY KEY,
    data JSON
);
";

/// The most recent error recorded against a connection, keyed by the
/// operation that raised it.
#[derive(Debug, Clone)]
pub struct OperationError {
    pub operation: &'static str,
    pub message: String,
}

/// Report returned by [`SqliteStorage::purge_readings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    /// Rows removed by the delete.
    pub removed: u64,
    /// Rows matching the age filter that would have been purged with
    /// `id < sent`, counted before the delete.
    pub unsent_purged: u64,
    /// Rows with `id > sent` remaining after the delete.
    pub unsent_retained: u64,
    /// Total rows remaining after the purge.
    pub readings: u64,
}

/// SQLite storage backend.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    last_error: Mutex<Option<OperationError>>,
}

impl SqliteStorage {
    /// Open the database named by the `DB_CONNECTION` environment variable
    /// (defaulting to `foglamp.db`) and ensure the schema.
    pub fn open_default() -> Result<Self> {
        Self::open(&database_path())
    }

    /// Open (or create) the database at `path` and ensure the schema.
    pub fn open(path: &str) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database; used by tests and embedded scenarios.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            last_error: Mutex::new(None),
        })
    }

    /// The most recent recorded operation error, if any.
    pub fn last_error(&self) -> Option<OperationError> {
        self.last_error.lock().clone()
    }

    fn record_error(&self, operation: &'static str, message: impl Into<String>) {
        let message = message.into();
        warn!(operation, %message, "storage operation failed");
        *self.last_error.lock() = Some(OperationError { operation, message });
    }

    /// Run a retrieve payload against a table and map the result.
    pub fn retrieve(&self, table: &str, payload: &Value) -> Result<ResultDocument> {
        let sql = translator::retrieve(table, payload).inspect_err(|e| {
            self.record_error("retrieve", e.to_string());
        })?;
        self.query_sql("retrieve", &sql)
    }

    /// Insert one row described by an insert payload.
    pub fn insert(&self, table: &str, payload: &Value) -> Result<()> {
        let sql = translator::insert(table, payload).inspect_err(|e| {
            self.record_error("insert", e.to_string());
        })?;
        self.execute_sql("insert", &sql).map(|_| ())
    }

    /// Apply an update payload; returns the number of affected rows.
    pub fn update(&self, table: &str, payload: &Value) -> Result<i64> {
        let sql = translator::update(table, payload).inspect_err(|e| {
            self.record_error("update", e.to_string());
        })?;
        self.execute_sql("update", &sql)
    }

    /// Apply a delete payload; returns the number of removed rows.
    pub fn delete_rows(&self, table: &str, payload: &Value) -> Result<i64> {
        let sql = translator::delete(table, payload).inspect_err(|e| {
            self.record_error("delete", e.to_string());
        })?;
        self.execute_sql("delete", &sql)
    }

    /// Fetch a block of readings starting at `id`.
    ///
    /// The caller advances its cursor to the maximum returned `id` plus one.
    /// Rows committed concurrently with ids below an already-consumed cursor
    /// can be returned again after a cursor rollback; downstream consumers
    /// must tolerate at-least-once delivery.
    pub fn fetch_readings(&self, id: u64, blksize: u32) -> Result<ResultDocument> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM readings WHERE id >= ?1 LIMIT ?2")
            .map_err(|e| {
                self.record_error("fetchReadings", e.to_string());
                EdgelineError::from(e)
            })?;
        map_result(&mut stmt, (id as i64, blksize as i64), &mut |op, msg| {
            self.record_error(op, msg)
        })
    }

    /// Purge readings older than `age_seconds`.
    ///
    /// When any bit of `flags` is set the purge is restricted to rows
    /// already sent downstream (`id < sent_id`). The post-delete counts in
    /// the report are best-effort: a failed count yields zero for that
    /// field and records a non-fatal error.
    pub fn purge_readings(&self, age_seconds: u64, flags: u32, sent_id: u64) -> Result<PurgeReport> {
        let conn = self.conn.lock();

        // Rows the age filter will remove that are below the sent watermark,
        // counted before the delete changes the table.
        let mut unsent = SqlBuffer::new();
        unsent.append("SELECT count(*) FROM readings WHERE user_ts < datetime('now', '-");
        unsent.append_u64(age_seconds);
        unsent.append(" seconds') AND id < ");
        unsent.append_u64(sent_id);
        let unsent_purged = self.count_rows(&conn, &unsent.coalesce(), "purgeReadings");

        let mut sql = SqlBuffer::new();
        sql.append("DELETE FROM readings WHERE user_ts < datetime('now', '-");
        sql.append_u64(age_seconds);
        sql.append(" seconds')");
        if flags != 0 {
            sql.append(" AND id < ");
            sql.append_u64(sent_id);
        }
        let removed = conn.execute(&sql.coalesce(), []).map_err(|e| {
            self.record_error("purgeReadings", e.to_string());
            EdgelineError::from(e)
        })? as u64;

        let mut retained = SqlBuffer::new();
        retained.append("SELECT count(*) FROM readings WHERE id > ");
        retained.append_u64(sent_id);
        let unsent_retained = self.count_rows(&conn, &retained.coalesce(), "purgeReadings");
        let readings = self.count_rows(&conn, "SELECT count(*) FROM readings", "purgeReadings");

        debug!(removed, age_seconds, flags, sent_id, "purged readings");
        Ok(PurgeReport {
            removed,
            unsent_purged,
            unsent_retained,
            readings,
        })
    }

    /// Best-effort scalar count: failures record a non-fatal error and
    /// report zero.
    fn count_rows(&self, conn: &Connection, sql: &str, operation: &'static str) -> u64 {
        match conn.query_row(sql, [], |row| row.get::<_, i64>(0)) {
            Ok(count) => count.max(0) as u64,
            Err(e) => {
                self.record_error(operation, e.to_string());
                0
            }
        }
    }

    fn query_sql(&self, operation: &'static str, sql: &str) -> Result<ResultDocument> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(|e| {
            self.record_error(operation, e.to_string());
            EdgelineError::from(e)
        })?;
        map_result(&mut stmt, [], &mut |op, msg| self.record_error(op, msg))
    }

    fn execute_sql(&self, operation: &'static str, sql: &str) -> Result<i64> {
        let conn = self.conn.lock();
        match conn.execute(sql, []) {
            Ok(changed) => Ok(changed as i64),
            Err(e) => {
                self.record_error(operation, e.to_string());
                Err(EdgelineError::from(e))
            }
        }
    }
}

impl StorageClient for SqliteStorage {
    fn query_table(&self, table: &str, payload: &QueryPayload) -> Result<ResultDocument> {
        self.retrieve(table, &payload.to_value())
    }

    fn insert_table(&self, table: &str, values: &InsertValues) -> Result<()> {
        self.insert(table, &values.to_value())
    }

    fn update_table(
        &self,
        table: &str,
        updates: &[(ExpressionValues, WhereClause)],
    ) -> Result<i64> {
        // Translate every statement before touching the connection so a
        // malformed batch has no side effect.
        let mut statements = Vec::with_capacity(updates.len());
        for (expressions, clause) in updates {
            let payload = serde_json::json!({
                "expressions": expressions,
                "condition": clause,
            });
            let sql = translator::update(table, &payload).inspect_err(|e| {
                self.record_error("update", e.to_string());
            })?;
            statements.push(sql);
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| {
            self.record_error("update", e.to_string());
            EdgelineError::from(e)
        })?;
        let mut affected = 0i64;
        for sql in &statements {
            match tx.execute(sql, []) {
                Ok(changed) => affected += changed as i64,
                Err(e) => {
                    self.record_error("update", e.to_string());
                    return Err(EdgelineError::from(e));
                }
            }
        }
        tx.commit().map_err(|e| {
            self.record_error("update", e.to_string());
            EdgelineError::from(e)
        })?;
        Ok(affected)
    }

    fn delete_table(&self, table: &str, condition: &WhereClause) -> Result<i64> {
        self.delete_rows(table, &serde_json::json!({ "where": condition }))
    }

    fn reading_append(&self, readings: &[Reading]) -> Result<()> {
        if readings.is_empty() {
            return Ok(());
        }
        let payload = serde_json::json!({ "readings": readings });
        let sql = translator::append_readings(&payload).inspect_err(|e| {
            self.record_error("appendReadings", e.to_string());
        })?;

        // One multi-row INSERT: the batch commits or none of it does.
        let conn = self.conn.lock();
        match conn.execute(&sql, []) {
            Ok(rows) => {
                debug!(rows, "appended readings");
                Ok(())
            }
            Err(e) => {
                self.record_error("appendReadings", e.to_string());
                Err(EdgelineError::from(e))
            }
        }
    }
}
