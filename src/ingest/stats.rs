//! Background aggregation of per-asset ingest statistics.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::sql::query::{Expression, InsertValues, QueryPayload, WhereClause};
use crate::storage::client::StorageClient;

/// Statistics key for the total of successfully appended readings.
pub const READINGS_KEY: &str = "READINGS";

/// Statistics key for readings dropped after an unrecoverable append failure.
pub const DISCARDED_KEY: &str = "DISCARDED";

/// Statistics key for one asset: `INGEST_<UPPERCASE(asset)>`.
pub fn ingest_key(asset: &str) -> String {
    format!("INGEST_{}", asset.to_uppercase())
}

#[derive(Default)]
struct StatsState {
    /// Per-asset counts accumulated since the last successful flush.
    pending: HashMap<String, u64>,
    discarded: u64,
    /// Assets known to already have a statistics row.
    known_keys: HashSet<String>,
}

/// Coalesces per-asset ingest counts and flushes them to the statistics
/// table from a dedicated thread.
///
/// The drain thread merges counts under the state lock and signals; the
/// statistics thread wakes, lazily creates missing statistics rows, and
/// applies all increments as one batched update. A failed flush retains the
/// pending state for the next signal; statistics loss never invalidates
/// reading data.
pub struct StatsCollector {
    state: Mutex<StatsState>,
    signal: Condvar,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StatsState::default()),
            signal: Condvar::new(),
        }
    }

    /// Merge the per-asset counts of one successfully appended batch.
    pub fn add_batch(&self, counts: &HashMap<String, u64>) {
        let mut state = self.state.lock();
        for (asset, count) in counts {
            *state.pending.entry(asset.clone()).or_insert(0) += count;
        }
    }

    /// Charge `count` readings against the discarded counter.
    pub fn add_discarded(&self, count: u64) {
        self.state.lock().discarded += count;
    }

    /// Wake the aggregator. Notified under the state lock so a waiter
    /// cannot miss a wakeup between its running check and the wait.
    pub fn signal(&self) {
        let _state = self.state.lock();
        self.signal.notify_all();
    }

    /// Total pending (not yet flushed) readings, plus the discarded count.
    pub fn pending_totals(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.pending.values().sum(), state.discarded)
    }

    /// One aggregator iteration: wait for a signal while `running`, then
    /// flush whatever is pending into the statistics table.
    pub fn update(&self, storage: &dyn StorageClient, running: &AtomicBool) {
        let mut state = self.state.lock();
        if running.load(Ordering::SeqCst) {
            self.signal.wait(&mut state);
        }
        if state.pending.is_empty() && state.discarded == 0 {
            return;
        }

        let StatsState {
            pending,
            discarded,
            known_keys,
        } = &mut *state;

        // Lazily create missing statistics rows; creation is a
        // select-then-insert and therefore idempotent.
        for asset in pending.keys() {
            if !known_keys.contains(asset) && Self::ensure_row(storage, asset).is_ok() {
                known_keys.insert(asset.clone());
            }
        }

        let mut updates: Vec<(Vec<Expression>, WhereClause)> = Vec::new();
        let mut readings_total = 0i64;
        for (asset, count) in pending.iter() {
            if *count > 0 {
                updates.push((
                    vec![Expression::increment("value", *count as i64)],
                    WhereClause::equals("key", ingest_key(asset)),
                ));
                readings_total += *count as i64;
            }
        }
        if readings_total > 0 {
            updates.push((
                vec![Expression::increment("value", readings_total)],
                WhereClause::equals("key", READINGS_KEY),
            ));
        }
        if *discarded > 0 {
            updates.push((
                vec![Expression::increment("value", *discarded as i64)],
                WhereClause::equals("key", DISCARDED_KEY),
            ));
        }
        if updates.is_empty() {
            pending.clear();
            return;
        }

        match storage.update_table("statistics", &updates) {
            Ok(affected) => {
                debug!(affected, readings = readings_total, "statistics flushed");
                pending.clear();
                *discarded = 0;
            }
            Err(e) => {
                info!(error = %e, "statistics update failed, will retry on next signal");
            }
        }
    }

    /// Create the statistics row for `asset` if it does not exist yet.
    fn ensure_row(storage: &dyn StorageClient, asset: &str) -> crate::error::Result<()> {
        let key = ingest_key(asset);
        let payload = QueryPayload::with_where(WhereClause::equals("key", key.clone()));
        let existing = storage.query_table("statistics", &payload)?;
        if existing.count == 0 {
            let mut values = InsertValues::new();
            values.push("key", key);
            values.push("description", format!("Readings received from asset {asset}"));
            values.push("value", 0);
            values.push("previous_value", 0);
            storage.insert_table("statistics", &values)?;
        }
        Ok(())
    }
}
