//! Mapping of a SQL row set into the canonical JSON result document.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rusqlite::types::ValueRef;
use rusqlite::Statement;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::Result;

/// Canonical result document: `{"count": N, "rows": [{col: val, ...}, ...]}`.
///
/// Column order within a row and row order follow the backend's declared
/// order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultDocument {
    pub count: usize,
    pub rows: Vec<Map<String, Value>>,
}

impl ResultDocument {
    /// The value of `column` in the first row, as an integer.
    pub fn first_i64(&self, column: &str) -> Option<i64> {
        self.rows.first()?.get(column)?.as_i64()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Execute a prepared statement and map its rows.
///
/// Cell mapping is keyed on the column's declared type and the cell's
/// storage class: declared-JSON text parses into a JSON value (a parse
/// failure skips the column, reports through `on_error`, and the mapping
/// continues), integers and reals become JSON numbers, declared CHAR(n)
/// text is right-trimmed of spaces, blobs are base64-encoded, and
/// everything else is passed through as text.
pub fn map_result<P: rusqlite::Params>(
    stmt: &mut Statement<'_>,
    params: P,
    on_error: &mut dyn FnMut(&'static str, String),
) -> Result<ResultDocument> {
    let columns: Vec<(String, Option<String>)> = stmt
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
        .collect();

    let mut document = ResultDocument::default();
    let mut rows = stmt.query(params)?;
    while let Some(row) = rows.next()? {
        let mut mapped = Map::new();
        for (index, (name, decl)) in columns.iter().enumerate() {
            let cell = row.get_ref(index)?;
            if let Some(value) = map_cell(name, decl.as_deref(), cell, on_error) {
                mapped.insert(name.clone(), value);
            }
        }
        document.rows.push(mapped);
    }
    document.count = document.rows.len();
    Ok(document)
}

fn map_cell(
    name: &str,
    decl: Option<&str>,
    cell: ValueRef<'_>,
    on_error: &mut dyn FnMut(&'static str, String),
) -> Option<Value> {
    match cell {
        ValueRef::Null => Some(Value::Null),
        ValueRef::Integer(i) => Some(Value::Number(Number::from(i))),
        ValueRef::Real(f) => Some(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)),
        ValueRef::Blob(bytes) => Some(Value::String(BASE64.encode(bytes))),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            let decl = decl.map(str::to_ascii_uppercase).unwrap_or_default();
            if decl.contains("JSON") {
                match serde_json::from_str(&text) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        on_error("resultSet", format!("failed to parse column {name}: {e}"));
                        None
                    }
                }
            } else if decl.starts_with("CHAR") {
                Some(Value::String(text.trim_end_matches(' ').to_string()))
            } else {
                // Timestamps and any other declared type pass through verbatim.
                Some(Value::String(text.into_owned()))
            }
        }
    }
}
