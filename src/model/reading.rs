//! Reading value objects.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Timestamp format used for reading `user_ts` values; sorts correctly as a
/// string and compares against SQLite's `datetime('now')` output.
const USER_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One time-stamped sensor observation.
///
/// `user_ts` is either a formatted timestamp or a server-side function
/// expression such as `datetime('now')`, resolved by the backend at append
/// time. `id` is assigned by the backend and is only present on readings
/// fetched back out of storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub asset_code: String,
    pub read_key: String,
    pub reading: Value,
    pub user_ts: String,
}

impl Reading {
    /// Create a reading stamped with the current UTC time and a fresh read key.
    pub fn new(asset_code: impl Into<String>, reading: Value) -> Self {
        Self::with_timestamp(
            asset_code,
            reading,
            Utc::now().format(USER_TS_FORMAT).to_string(),
        )
    }

    /// Create a reading with an explicit `user_ts`.
    pub fn with_timestamp(
        asset_code: impl Into<String>,
        reading: Value,
        user_ts: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            asset_code: asset_code.into(),
            read_key: Uuid::new_v4().to_string(),
            reading,
            user_ts: user_ts.into(),
        }
    }
}

/// An owned, ordered batch of readings passed between filter stages.
///
/// The set carries exclusive ownership of its readings while inside the
/// pipeline; the final stage hands them back to the ingest engine via
/// [`into_readings`](ReadingSet::into_readings).
#[derive(Debug, Default)]
pub struct ReadingSet {
    readings: Vec<Reading>,
}

impl ReadingSet {
    pub fn new(readings: Vec<Reading>) -> Self {
        Self { readings }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Mutable access for filters that transform readings in place.
    pub fn readings_mut(&mut self) -> &mut Vec<Reading> {
        &mut self.readings
    }

    pub fn append(&mut self, reading: Reading) {
        self.readings.push(reading);
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn into_readings(self) -> Vec<Reading> {
        self.readings
    }
}

impl From<Vec<Reading>> for ReadingSet {
    fn from(readings: Vec<Reading>) -> Self {
        Self::new(readings)
    }
}
