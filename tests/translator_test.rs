//! Scenario tests for the JSON-to-SQL translator.

use edgeline::sql::translator;
use serde_json::{json, Value};

#[test]
fn test_star_select_with_where_and_modifiers() {
    let payload = json!({
        "where": {"column": "asset_code", "condition": "=", "value": "pump"},
        "sort": {"column": "user_ts", "direction": "desc"},
        "limit": 5
    });
    let sql = translator::retrieve("readings", &payload).unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM readings WHERE asset_code = 'pump' ORDER BY user_ts DESC LIMIT 5"
    );
}

#[test]
fn test_aggregate_group_limit() {
    let payload = json!({
        "aggregate": {"operation": "avg", "column": "value"},
        "group": "asset_code",
        "limit": 10
    });
    let sql = translator::retrieve("readings", &payload).unwrap();
    assert_eq!(
        sql,
        "SELECT avg(value) AS \"avg_value\", asset_code FROM readings GROUP BY asset_code LIMIT 10"
    );
}

#[test]
fn test_aggregate_array() {
    let payload = json!({
        "aggregate": [
            {"operation": "min", "column": "value"},
            {"operation": "max", "column": "value"}
        ]
    });
    let sql = translator::retrieve("readings", &payload).unwrap();
    assert_eq!(
        sql,
        "SELECT min(value) AS \"min_value\", max(value) AS \"max_value\" FROM readings"
    );
}

#[test]
fn test_json_path_projection_with_alias() {
    let payload = json!({
        "return": [
            {"json": {"column": "reading", "properties": ["temperature", "c"]}, "alias": "t"}
        ]
    });
    let sql = translator::retrieve("readings", &payload).unwrap();
    assert_eq!(sql, "SELECT reading->'temperature'->'c' AS \"t\" FROM readings");
}

#[test]
fn test_json_path_single_property() {
    let payload = json!({
        "return": ["asset_code", {"json": {"column": "reading", "properties": "rpm"}}]
    });
    let sql = translator::retrieve("readings", &payload).unwrap();
    assert_eq!(sql, "SELECT asset_code, reading->'rpm' FROM readings");
}

#[test]
fn test_projection_with_column_alias() {
    let payload = json!({
        "return": [{"column": "user_ts", "alias": "timestamp"}, "asset_code"]
    });
    let sql = translator::retrieve("readings", &payload).unwrap();
    assert_eq!(sql, "SELECT user_ts AS \"timestamp\", asset_code FROM readings");
}

#[test]
fn test_where_chain_is_parenthesized() {
    let payload = json!({
        "where": {
            "column": "a", "condition": "=", "value": 1,
            "and": {
                "column": "b", "condition": ">", "value": 2,
                "or": {"column": "c", "condition": "<", "value": 3}
            }
        }
    });
    let sql = translator::retrieve("t", &payload).unwrap();
    assert_eq!(sql, "SELECT * FROM t WHERE a = 1 AND (b = 2 OR (c = 3))");
}

#[test]
fn test_where_string_values_are_escaped() {
    let payload = json!({
        "where": {"column": "asset_code", "condition": "=", "value": "o'brien"}
    });
    let sql = translator::retrieve("readings", &payload).unwrap();
    assert_eq!(sql, "SELECT * FROM readings WHERE asset_code = 'o''brien'");
}

#[test]
fn test_multi_sort_defaults_ascending() {
    let payload = json!({
        "sort": [
            {"column": "asset_code"},
            {"column": "user_ts", "direction": "DESC"}
        ]
    });
    let sql = translator::retrieve("readings", &payload).unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM readings ORDER BY asset_code ASC, user_ts DESC"
    );
}

#[test]
fn test_skip_and_limit_pagination() {
    let both = translator::retrieve("readings", &json!({"limit": 10, "skip": 20})).unwrap();
    assert_eq!(both, "SELECT * FROM readings LIMIT 10 OFFSET 20");

    // An offset cannot stand alone in the target dialect.
    let skip_only = translator::retrieve("readings", &json!({"skip": 20})).unwrap();
    assert_eq!(skip_only, "SELECT * FROM readings LIMIT -1 OFFSET 20");
}

#[test]
fn test_insert_renders_nested_object_as_json() {
    let payload = json!({
        "key": "INGEST_PUMP",
        "meta": {"source": "south"},
        "value": 0
    });
    let sql = translator::insert("statistics", &payload).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO statistics (key, meta, value) VALUES ('INGEST_PUMP', '{\"source\":\"south\"}', 0)"
    );
}

#[test]
fn test_update_values_and_condition() {
    let payload = json!({
        "values": {"description": "it's fine", "value": 3},
        "condition": {"column": "key", "condition": "=", "value": "READINGS"}
    });
    let sql = translator::update("statistics", &payload).unwrap();
    assert_eq!(
        sql,
        "UPDATE statistics SET description = 'it''s fine', value = 3 WHERE key = 'READINGS'"
    );
}

#[test]
fn test_update_expressions() {
    let payload = json!({
        "expressions": [{"column": "value", "operator": "+", "value": 7}],
        "condition": {"column": "key", "condition": "=", "value": "READINGS"}
    });
    let sql = translator::update("statistics", &payload).unwrap();
    assert_eq!(
        sql,
        "UPDATE statistics SET value = value + 7 WHERE key = 'READINGS'"
    );
}

#[test]
fn test_update_without_values_is_an_error() {
    let payload = json!({
        "condition": {"column": "key", "condition": "=", "value": "READINGS"}
    });
    let err = translator::update("statistics", &payload).unwrap_err();
    assert!(err.to_string().contains("missing values"));
}

#[test]
fn test_delete_forms() {
    assert_eq!(
        translator::delete("readings", &Value::Null).unwrap(),
        "DELETE FROM readings"
    );
    let payload = json!({"where": {"column": "id", "condition": "<", "value": 100}});
    assert_eq!(
        translator::delete("readings", &payload).unwrap(),
        "DELETE FROM readings WHERE id < 100"
    );
}

#[test]
fn test_append_readings_emits_one_multi_row_insert() {
    let payload = json!({"readings": [
        {"asset_code": "pump", "read_key": "k1", "reading": {"rpm": 100}, "user_ts": "2024-01-01 00:00:00"},
        {"asset_code": "fan", "read_key": "k2", "reading": {"rpm": 200}, "user_ts": "2024-01-01 00:00:01"}
    ]});
    let sql = translator::append_readings(&payload).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO readings (asset_code, read_key, reading, user_ts) VALUES \
         ('pump', 'k1', '{\"rpm\":100}', '2024-01-01 00:00:00'), \
         ('fan', 'k2', '{\"rpm\":200}', '2024-01-01 00:00:01')"
    );
}

#[test]
fn test_unknown_query_options_are_ignored() {
    let payload = json!({"limit": 1, "unrecognized": true});
    let sql = translator::retrieve("readings", &payload).unwrap();
    assert_eq!(sql, "SELECT * FROM readings LIMIT 1");
}
