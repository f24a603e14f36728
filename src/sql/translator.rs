//! Translation of the JSON query language into SQL.
//!
//! Stateless: every operation takes a table name and a JSON payload and
//! returns generated SQL or a translation error. The generated dialect is
//! SQLite — `->` JSON navigation, `datetime('now', ...)` as the server-side
//! clock, and `LIMIT`/`OFFSET` pagination.
//!
//! String values are rendered as single-quoted literals with embedded quotes
//! doubled. The one exception is the function-call pattern
//! `^[A-Za-z][A-Za-z0-9_]*\(.*\)$`, which is emitted verbatim so payloads
//! can defer to server-side expressions such as `datetime('now')`.
//! Identifiers (column names, aggregate operations) are validated against a
//! bare-word pattern, and predicate conditions against a fixed operator set,
//! so no payload slot can carry raw SQL.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{EdgelineError, Result};

use super::buffer::SqlBuffer;
use super::query::{
    Aggregate, Expression, JsonAccessor, OneOrMany, QueryPayload, ReturnEntry, WhereClause,
};

/// Comparison operators accepted in a `where` node.
const CONDITIONS: &[&str] = &["=", "!=", "<>", "<", "<=", ">", ">=", "LIKE"];

/// Arithmetic operators accepted in an update expression.
const EXPRESSION_OPERATORS: &[&str] = &["+", "-", "*", "/"];

static FUNCTION_CALL: OnceLock<Regex> = OnceLock::new();

/// Strings matching this pattern are emitted verbatim as server-side
/// function calls rather than quoted literals.
#[allow(clippy::expect_used)]
fn function_call_pattern() -> &'static Regex {
    FUNCTION_CALL
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*\(.*\)$").expect("static pattern"))
}

static IDENTIFIER: OnceLock<Regex> = OnceLock::new();

#[allow(clippy::expect_used)]
fn identifier_pattern() -> &'static Regex {
    IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"))
}

fn check_identifier(operation: &'static str, name: &str) -> Result<()> {
    if identifier_pattern().is_match(name) {
        Ok(())
    } else {
        Err(EdgelineError::translation(
            operation,
            format!("invalid identifier '{name}'"),
        ))
    }
}

/// Translate a retrieve payload into a `SELECT` statement.
///
/// An empty payload selects everything. `aggregate` overrides `return`;
/// either overrides the star projection. `where` and the modifiers (sort,
/// group, skip, limit) are appended when present.
pub fn retrieve(table: &str, payload: &Value) -> Result<String> {
    check_identifier("retrieve", table)?;
    let mut sql = SqlBuffer::new();

    if payload_is_empty(payload) {
        sql.append("SELECT * FROM ");
        sql.append(table);
        return Ok(sql.coalesce());
    }

    let query: QueryPayload = serde_json::from_value(payload.clone())
        .map_err(|e| EdgelineError::translation("retrieve", e.to_string()))?;

    if let Some(aggregates) = &query.aggregate {
        sql.append("SELECT ");
        append_aggregates(aggregates, query.group.as_deref(), &mut sql)?;
        sql.append(" FROM ");
    } else if let Some(returns) = &query.returns {
        sql.append("SELECT ");
        append_projection(returns, &mut sql)?;
        sql.append(" FROM ");
    } else {
        sql.append("SELECT * FROM ");
    }
    sql.append(table);

    if let Some(clause) = &query.where_clause {
        sql.append(" WHERE ");
        append_where(clause, &mut sql, "retrieve")?;
    }
    append_modifiers(&query, &mut sql)?;

    Ok(sql.coalesce())
}

/// Translate an insert payload into an `INSERT` statement.
///
/// Each top-level member of the payload becomes a column/value pair, in
/// payload order.
pub fn insert(table: &str, payload: &Value) -> Result<String> {
    check_identifier("insert", table)?;
    let members = payload.as_object().filter(|m| !m.is_empty()).ok_or_else(|| {
        EdgelineError::translation("insert", "payload must be a non-empty JSON object")
    })?;

    let mut sql = SqlBuffer::new();
    let mut values = SqlBuffer::new();
    sql.append("INSERT INTO ");
    sql.append(table);
    sql.append(" (");
    for (col, (column, value)) in members.iter().enumerate() {
        check_identifier("insert", column)?;
        if col > 0 {
            sql.append(", ");
            values.append(", ");
        }
        sql.append(column);
        append_value_literal(value, &mut values, "insert")?;
    }
    sql.append(") VALUES (");
    sql.append(&values.coalesce());
    sql.append(")");

    Ok(sql.coalesce())
}

#[derive(serde::Deserialize)]
struct UpdatePayload {
    values: Option<serde_json::Map<String, Value>>,
    expressions: Option<Vec<Expression>>,
    condition: Option<WhereClause>,
    #[serde(rename = "where")]
    where_clause: Option<WhereClause>,
}

/// Translate an update payload into an `UPDATE` statement.
///
/// The payload must carry a `values` object (columns to set, rendered like
/// insert values) and/or an `expressions` array of self-referential terms
/// (`column = column <op> value`). An optional `condition` (or `where`)
/// restricts the update.
pub fn update(table: &str, payload: &Value) -> Result<String> {
    check_identifier("update", table)?;
    let update: UpdatePayload = serde_json::from_value(payload.clone())
        .map_err(|e| EdgelineError::translation("update", e.to_string()))?;

    if update.values.is_none() && update.expressions.is_none() {
        return Err(EdgelineError::translation(
            "update",
            "missing values object in payload",
        ));
    }

    let mut sql = SqlBuffer::new();
    sql.append("UPDATE ");
    sql.append(table);
    sql.append(" SET ");

    let mut col = 0;
    if let Some(values) = &update.values {
        for (column, value) in values {
            check_identifier("update", column)?;
            if col > 0 {
                sql.append(", ");
            }
            sql.append(column);
            sql.append(" = ");
            append_value_literal(value, &mut sql, "update")?;
            col += 1;
        }
    }
    if let Some(expressions) = &update.expressions {
        for expr in expressions {
            if col > 0 {
                sql.append(", ");
            }
            append_expression(expr, &mut sql)?;
            col += 1;
        }
    }
    if col == 0 {
        return Err(EdgelineError::translation(
            "update",
            "no columns to update in payload",
        ));
    }

    if let Some(clause) = update.condition.as_ref().or(update.where_clause.as_ref()) {
        sql.append(" WHERE ");
        append_where(clause, &mut sql, "update")?;
    }

    Ok(sql.coalesce())
}

/// Translate a delete payload into a `DELETE` statement.
///
/// An empty payload deletes every row; otherwise `where` is required.
pub fn delete(table: &str, payload: &Value) -> Result<String> {
    check_identifier("delete", table)?;
    let mut sql = SqlBuffer::new();
    sql.append("DELETE FROM ");
    sql.append(table);

    if payload_is_empty(payload) {
        return Ok(sql.coalesce());
    }

    let query: QueryPayload = serde_json::from_value(payload.clone())
        .map_err(|e| EdgelineError::translation("delete", e.to_string()))?;
    match &query.where_clause {
        Some(clause) => {
            sql.append(" WHERE ");
            append_where(clause, &mut sql, "delete")?;
        }
        None => {
            return Err(EdgelineError::translation(
                "delete",
                "payload does not contain a where clause",
            ));
        }
    }

    Ok(sql.coalesce())
}

/// Translate an append payload (`{"readings": [...]}`) into one multi-row
/// `INSERT` against the readings table.
pub fn append_readings(payload: &Value) -> Result<String> {
    let readings = payload
        .get("readings")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            EdgelineError::translation("appendReadings", "payload is missing the readings array")
        })?;
    if readings.is_empty() {
        return Err(EdgelineError::translation(
            "appendReadings",
            "readings array is empty",
        ));
    }

    let mut sql = SqlBuffer::new();
    sql.append("INSERT INTO readings (asset_code, read_key, reading, user_ts) VALUES ");

    for (row, reading) in readings.iter().enumerate() {
        if !reading.is_object() {
            return Err(EdgelineError::translation(
                "appendReadings",
                "each reading in the readings array must be an object",
            ));
        }
        if row > 0 {
            sql.append(", (");
        } else {
            sql.append_char('(');
        }
        sql.append_quoted(required_str(reading, "asset_code")?);
        sql.append(", ");
        sql.append_quoted(required_str(reading, "read_key")?);
        sql.append(", ");
        let body = reading.get("reading").ok_or_else(|| {
            EdgelineError::translation("appendReadings", "reading is missing the reading payload")
        })?;
        sql.append_quoted(&serde_json::to_string(body)?);
        sql.append(", ");
        let user_ts = required_str(reading, "user_ts")?;
        if function_call_pattern().is_match(user_ts) {
            sql.append(user_ts);
        } else {
            sql.append_quoted(user_ts);
        }
        sql.append_char(')');
    }

    Ok(sql.coalesce())
}

fn required_str<'a>(reading: &'a Value, member: &'static str) -> Result<&'a str> {
    reading.get(member).and_then(Value::as_str).ok_or_else(|| {
        EdgelineError::translation(
            "appendReadings",
            format!("reading is missing the {member} property"),
        )
    })
}

fn payload_is_empty(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(members) => members.is_empty(),
        _ => false,
    }
}

/// Render a payload value as a SQL literal: numbers verbatim, booleans as
/// 0/1, strings quoted unless they match the function-call pattern, nested
/// structures as quoted JSON.
fn append_value_literal(
    value: &Value,
    sql: &mut SqlBuffer,
    operation: &'static str,
) -> Result<()> {
    match value {
        Value::String(s) => {
            if function_call_pattern().is_match(s) {
                sql.append(s);
            } else {
                sql.append_quoted(s);
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                sql.append_i64(i);
            } else if let Some(u) = n.as_u64() {
                sql.append_u64(u);
            } else {
                sql.append_f64(n.as_f64().unwrap_or_default());
            }
        }
        Value::Bool(b) => sql.append(if *b { "1" } else { "0" }),
        Value::Null => sql.append("NULL"),
        Value::Object(_) | Value::Array(_) => {
            let text = serde_json::to_string(value)
                .map_err(|e| EdgelineError::translation(operation, e.to_string()))?;
            sql.append_quoted(&text);
        }
    }
    Ok(())
}

/// Render the aggregate projection list; with a group present the group
/// column is appended as an extra projection column after the aggregates.
fn append_aggregates(
    aggregates: &OneOrMany<Aggregate>,
    group: Option<&str>,
    sql: &mut SqlBuffer,
) -> Result<()> {
    for (index, aggregate) in aggregates.iter().enumerate() {
        check_identifier("retrieve", &aggregate.operation)?;
        check_identifier("retrieve", &aggregate.column)?;
        if index > 0 {
            sql.append(", ");
        }
        sql.append(&aggregate.operation);
        sql.append_char('(');
        sql.append(&aggregate.column);
        sql.append(") AS \"");
        sql.append(&aggregate.operation);
        sql.append_char('_');
        sql.append(&aggregate.column);
        sql.append_char('"');
    }
    if let Some(group) = group {
        check_identifier("retrieve", group)?;
        sql.append(", ");
        sql.append(group);
    }
    Ok(())
}

fn append_projection(returns: &[ReturnEntry], sql: &mut SqlBuffer) -> Result<()> {
    if returns.is_empty() {
        return Err(EdgelineError::translation(
            "retrieve",
            "the return property must be a non-empty array",
        ));
    }
    for (col, entry) in returns.iter().enumerate() {
        if col > 0 {
            sql.append(", ");
        }
        match entry {
            ReturnEntry::Column(column) => {
                check_identifier("retrieve", column)?;
                sql.append(column);
            }
            ReturnEntry::Projection(projection) => {
                if let Some(column) = &projection.column {
                    check_identifier("retrieve", column)?;
                    sql.append(column);
                } else if let Some(json) = &projection.json {
                    append_json_accessor(json, sql)?;
                } else {
                    return Err(EdgelineError::translation(
                        "retrieve",
                        "a return entry must carry a column or a json property",
                    ));
                }
                if let Some(alias) = &projection.alias {
                    sql.append(" AS \"");
                    sql.append(alias);
                    sql.append_char('"');
                }
            }
        }
    }
    Ok(())
}

/// `column->'p1'->'p2'->...` — each path segment single-quoted.
fn append_json_accessor(json: &JsonAccessor, sql: &mut SqlBuffer) -> Result<()> {
    check_identifier("retrieve", &json.column)?;
    sql.append(&json.column);
    for property in json.properties.iter() {
        sql.append("->");
        sql.append_quoted(property);
    }
    Ok(())
}

/// Render the recursive predicate. Each `and`/`or` child is wrapped in
/// parentheses, so the chaining is explicitly left-associative:
/// `a = 1 AND (b = 2) OR (c = 3)`.
fn append_where(clause: &WhereClause, sql: &mut SqlBuffer, operation: &'static str) -> Result<()> {
    check_identifier(operation, &clause.column)?;
    let condition = CONDITIONS
        .iter()
        .find(|c| c.eq_ignore_ascii_case(&clause.condition))
        .ok_or_else(|| {
            EdgelineError::translation(
                operation,
                format!("unsupported where condition '{}'", clause.condition),
            )
        })?;

    sql.append(&clause.column);
    sql.append_char(' ');
    sql.append(condition);
    sql.append_char(' ');
    match &clause.value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                sql.append_i64(i);
            } else {
                sql.append_f64(n.as_f64().unwrap_or_default());
            }
        }
        Value::String(s) => sql.append_quoted(s),
        other => {
            return Err(EdgelineError::translation(
                operation,
                format!("unsupported where value {other}"),
            ));
        }
    }

    if let Some(and) = &clause.and {
        sql.append(" AND (");
        append_where(and, sql, operation)?;
        sql.append_char(')');
    }
    if let Some(or) = &clause.or {
        sql.append(" OR (");
        append_where(or, sql, operation)?;
        sql.append_char(')');
    }
    Ok(())
}

/// `column = column <op> value`
fn append_expression(expr: &Expression, sql: &mut SqlBuffer) -> Result<()> {
    check_identifier("update", &expr.column)?;
    if !EXPRESSION_OPERATORS.contains(&expr.operator.as_str()) {
        return Err(EdgelineError::translation(
            "update",
            format!("unsupported expression operator '{}'", expr.operator),
        ));
    }
    sql.append(&expr.column);
    sql.append(" = ");
    sql.append(&expr.column);
    sql.append_char(' ');
    sql.append(&expr.operator);
    sql.append_char(' ');
    append_value_literal(&expr.value, sql, "update")
}

/// Append the sort, group, skip and limit modifiers, in that order.
///
/// SQLite requires `LIMIT` to precede `OFFSET`, and an `OFFSET` cannot stand
/// alone, so `skip` without `limit` renders as `LIMIT -1 OFFSET n`.
fn append_modifiers(query: &QueryPayload, sql: &mut SqlBuffer) -> Result<()> {
    if let Some(sort) = &query.sort {
        sql.append(" ORDER BY ");
        for (index, term) in sort.iter().enumerate() {
            check_identifier("retrieve", &term.column)?;
            if index > 0 {
                sql.append(", ");
            }
            sql.append(&term.column);
            sql.append_char(' ');
            match term.direction.as_deref() {
                None => sql.append("ASC"),
                Some(direction) if direction.eq_ignore_ascii_case("asc") => sql.append("ASC"),
                Some(direction) if direction.eq_ignore_ascii_case("desc") => sql.append("DESC"),
                Some(direction) => {
                    return Err(EdgelineError::translation(
                        "retrieve",
                        format!("unsupported sort direction '{direction}'"),
                    ));
                }
            }
        }
    }

    if let Some(group) = &query.group {
        check_identifier("retrieve", group)?;
        sql.append(" GROUP BY ");
        sql.append(group);
    }

    match (query.limit, query.skip) {
        (Some(limit), Some(skip)) => {
            sql.append(" LIMIT ");
            sql.append_u64(limit);
            sql.append(" OFFSET ");
            sql.append_u64(skip);
        }
        (Some(limit), None) => {
            sql.append(" LIMIT ");
            sql.append_u64(limit);
        }
        (None, Some(skip)) => {
            sql.append(" LIMIT -1 OFFSET ");
            sql.append_u64(skip);
        }
        (None, None) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retrieve_empty_payload_is_star_select() {
        assert_eq!(
            retrieve("readings", &Value::Null).unwrap(),
            "SELECT * FROM readings"
        );
        assert_eq!(
            retrieve("readings", &json!({})).unwrap(),
            "SELECT * FROM readings"
        );
    }

    #[test]
    fn test_retrieve_rejects_bad_table_name() {
        let err = retrieve("readings; DROP TABLE x", &Value::Null).unwrap_err();
        assert!(err.to_string().contains("invalid identifier"));
    }

    #[test]
    fn test_where_condition_allowlist() {
        let payload = json!({"where": {"column": "id", "condition": "; --", "value": 1}});
        assert!(retrieve("readings", &payload).is_err());

        let payload = json!({"where": {"column": "id", "condition": "like", "value": "a%"}});
        let sql = retrieve("readings", &payload).unwrap();
        assert_eq!(sql, "SELECT * FROM readings WHERE id LIKE 'a%'");
    }

    #[test]
    fn test_insert_quotes_and_escapes_strings() {
        let sql = insert("statistics", &json!({"key": "IT'S", "value": 1})).unwrap();
        assert_eq!(sql, "INSERT INTO statistics (key, value) VALUES ('IT''S', 1)");
    }

    #[test]
    fn test_insert_passes_function_calls_verbatim() {
        let sql = insert("readings", &json!({"user_ts": "datetime('now')"})).unwrap();
        assert_eq!(sql, "INSERT INTO readings (user_ts) VALUES (datetime('now'))");
    }

    #[test]
    fn test_update_requires_values() {
        let err = update("statistics", &json!({"condition": {"column": "key", "condition": "=", "value": "X"}}))
            .unwrap_err();
        assert!(err.to_string().contains("missing values"));
    }

    #[test]
    fn test_delete_requires_where_for_non_empty_payload() {
        assert_eq!(
            delete("readings", &Value::Null).unwrap(),
            "DELETE FROM readings"
        );
        assert!(delete("readings", &json!({"limit": 5})).is_err());
    }

    #[test]
    fn test_append_readings_multi_row() {
        let payload = json!({"readings": [
            {"asset_code": "a", "read_key": "k1", "reading": {"v": 1}, "user_ts": "2024-01-01 00:00:00"},
            {"asset_code": "b", "read_key": "k2", "reading": {"v": 2}, "user_ts": "datetime('now')"},
        ]});
        let sql = append_readings(&payload).unwrap();
        assert!(sql.starts_with(
            "INSERT INTO readings (asset_code, read_key, reading, user_ts) VALUES ('a', 'k1', "
        ));
        assert!(sql.contains("'{\"v\":1}'"));
        assert!(sql.ends_with(", datetime('now'))"));
    }

    #[test]
    fn test_append_readings_requires_array() {
        assert!(append_readings(&json!({})).is_err());
        assert!(append_readings(&json!({"readings": []})).is_err());
        assert!(append_readings(&json!({"readings": [42]})).is_err());
    }
}
