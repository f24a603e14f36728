//! SQLite-backed storage tests: append/fetch round trips, purge
//! accounting, and schema persistence.

use edgeline::model::Reading;
use edgeline::storage::{SqliteStorage, StorageClient};
use serde_json::json;
use tempfile::TempDir;

fn reading(asset: &str, value: i64) -> Reading {
    Reading::new(asset, json!({ "value": value }))
}

fn old_reading(asset: &str, value: i64) -> Reading {
    Reading::with_timestamp(asset, json!({ "value": value }), "2000-01-01 00:00:00.000000")
}

#[test]
fn test_append_then_fetch_round_trip() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let batch: Vec<Reading> = (0..5).map(|i| reading("pump", i)).collect();
    storage.reading_append(&batch).unwrap();

    let doc = storage.fetch_readings(1, 3).unwrap();
    assert_eq!(doc.count, 3);
    // Ids are monotonic in insertion order.
    assert_eq!(doc.rows[0]["id"], json!(1));
    assert_eq!(doc.rows[2]["id"], json!(3));
    // The JSON reading column comes back parsed.
    assert_eq!(doc.rows[0]["reading"], json!({"value": 0}));
    assert_eq!(doc.rows[0]["asset_code"], json!("pump"));

    // The caller's next cursor is max(id) + 1.
    let next = doc
        .rows
        .iter()
        .filter_map(|r| r["id"].as_i64())
        .max()
        .unwrap()
        + 1;
    let rest = storage.fetch_readings(next as u64, 10).unwrap();
    assert_eq!(rest.count, 2);
    assert_eq!(rest.rows[0]["id"], json!(4));
}

#[test]
fn test_fetch_past_the_end_is_empty() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.reading_append(&[reading("pump", 1)]).unwrap();
    let doc = storage.fetch_readings(100, 10).unwrap();
    assert_eq!(doc.count, 0);
    assert!(doc.rows.is_empty());
}

#[test]
fn test_json_path_retrieve_against_readings() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.reading_append(&[reading("pump", 7)]).unwrap();

    let doc = storage
        .retrieve(
            "readings",
            &json!({"return": [{"json": {"column": "reading", "properties": "value"}, "alias": "val"}]}),
        )
        .unwrap();
    assert_eq!(doc.count, 1);
    // The -> operator yields the JSON text of the sub-component.
    assert_eq!(doc.rows[0]["val"], json!("7"));
}

/// 100 rows; rows 51-90 match the age filter; watermark at id 61.
fn purge_fixture() -> SqliteStorage {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let batch: Vec<Reading> = (1..=100)
        .map(|i| {
            if (51..=90).contains(&i) {
                old_reading("pump", i)
            } else {
                reading("pump", i)
            }
        })
        .collect();
    storage.reading_append(&batch).unwrap();
    storage
}

#[test]
fn test_purge_with_unsent_protection() {
    let storage = purge_fixture();

    let report = storage.purge_readings(1800, 1, 61).unwrap();
    // Only the aged rows below the sent watermark (ids 51-60) go.
    assert_eq!(report.removed, 10);
    assert_eq!(report.unsent_purged, 10);
    // Rows above the watermark are untouched: ids 62-100.
    assert_eq!(report.unsent_retained, 39);
    assert_eq!(report.readings, 90);
}

#[test]
fn test_purge_without_flags_removes_all_aged_rows() {
    let storage = purge_fixture();

    let report = storage.purge_readings(1800, 0, 61).unwrap();
    assert_eq!(report.removed, 40);
    assert_eq!(report.readings, 60);

    // A second purge finds nothing left to remove.
    let again = storage.purge_readings(1800, 0, 61).unwrap();
    assert_eq!(again.removed, 0);
    assert_eq!(again.readings, 60);
}

#[test]
fn test_purge_report_serializes_camel_case() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let report = storage.purge_readings(60, 1, 0).unwrap();
    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["removed"], json!(0));
    assert_eq!(value["unsentPurged"], json!(0));
    assert_eq!(value["unsentRetained"], json!(0));
    assert_eq!(value["readings"], json!(0));
}

#[test]
fn test_database_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("edge.db");
    let path = path.to_str().unwrap();

    {
        let storage = SqliteStorage::open(path).unwrap();
        storage
            .reading_append(&[reading("pump", 1), reading("fan", 2)])
            .unwrap();
    }

    let storage = SqliteStorage::open(path).unwrap();
    let doc = storage.fetch_readings(1, 10).unwrap();
    assert_eq!(doc.count, 2);
    assert_eq!(doc.rows[1]["asset_code"], json!("fan"));
}

#[test]
fn test_reading_with_quote_survives_round_trip() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let tricky = Reading::new("o'brien", json!({"note": "it's fine"}));
    storage.reading_append(&[tricky]).unwrap();

    let doc = storage.fetch_readings(1, 1).unwrap();
    assert_eq!(doc.rows[0]["asset_code"], json!("o'brien"));
    assert_eq!(doc.rows[0]["reading"], json!({"note": "it's fine"}));
}

#[test]
fn test_server_side_timestamp_expression() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let reading = Reading::with_timestamp("pump", json!({"v": 1}), "datetime('now')");
    storage.reading_append(&[reading]).unwrap();

    let doc = storage.fetch_readings(1, 1).unwrap();
    // The backend resolved the expression into a real timestamp.
    let user_ts = doc.rows[0]["user_ts"].as_str().unwrap();
    assert!(user_ts.starts_with("20"));
    assert!(!user_ts.contains("datetime"));
}
