//! Typed form of the JSON query language.
//!
//! These types are both the deserialization target for payloads arriving as
//! JSON and the builder API for internal callers (the statistics aggregator,
//! the asset tracker, the plugin-data channel). A payload serializes back to
//! exactly the wire shape the translator accepts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One element or an array of elements; the query language accepts both
/// shapes for `aggregate` and `sort`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item).iter(),
            OneOrMany::Many(items) => items.iter(),
        }
    }
}

/// A retrieve/delete payload: projection, predicate, and modifiers.
///
/// `aggregate` overrides `return`; with neither present the projection is
/// `*`. Modifiers are applied in the order sort, group, skip, limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<OneOrMany<Aggregate>>,
    #[serde(rename = "return", skip_serializing_if = "Option::is_none")]
    pub returns: Option<Vec<ReturnEntry>>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<OneOrMany<SortBy>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl QueryPayload {
    /// A payload carrying only a `where` predicate.
    pub fn with_where(clause: WhereClause) -> Self {
        Self {
            where_clause: Some(clause),
            ..Self::default()
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// An aggregate projection: `operation(column) AS "operation_column"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    pub operation: String,
    pub column: String,
}

/// One ordering term; `direction` defaults to ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortBy {
    pub column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

/// One projection entry: a bare column name, a column with an alias, or a
/// JSON-path accessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReturnEntry {
    Column(String),
    Projection(ReturnProjection),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnProjection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<JsonAccessor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// JSON-path navigation into a JSON column: `column->'p1'->'p2'->...`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonAccessor {
    pub column: String,
    pub properties: OneOrMany<String>,
}

/// A recursive predicate node. `and`/`or` children chain onto the node's own
/// comparison; the translator wraps each child in parentheses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhereClause {
    pub column: String,
    pub condition: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub and: Option<Box<WhereClause>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub or: Option<Box<WhereClause>>,
}

impl WhereClause {
    pub fn new(
        column: impl Into<String>,
        condition: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            column: column.into(),
            condition: condition.into(),
            value: value.into(),
            and: None,
            or: None,
        }
    }

    /// Equality predicate, the common case.
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, "=", value)
    }

    pub fn and(mut self, clause: WhereClause) -> Self {
        self.and = Some(Box::new(clause));
        self
    }

    pub fn or(mut self, clause: WhereClause) -> Self {
        self.or = Some(Box::new(clause));
        self
    }
}

/// Ordered column/value pairs for an insert.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InsertValues(Map<String, Value>);

impl InsertValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// A self-referential update term: `column = column <operator> value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub column: String,
    pub operator: String,
    pub value: Value,
}

impl Expression {
    pub fn new(
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// `column = column + by`
    pub fn increment(column: impl Into<String>, by: i64) -> Self {
        Self::new(column, "+", by)
    }
}

/// A batch of update expressions applied under one predicate.
pub type ExpressionValues = Vec<Expression>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_deserializes_both_aggregate_shapes() {
        let one: QueryPayload =
            serde_json::from_value(json!({"aggregate": {"operation": "avg", "column": "v"}}))
                .unwrap();
        let many: QueryPayload = serde_json::from_value(
            json!({"aggregate": [{"operation": "min", "column": "v"}, {"operation": "max", "column": "v"}]}),
        )
        .unwrap();

        assert_eq!(one.aggregate.unwrap().iter().count(), 1);
        assert_eq!(many.aggregate.unwrap().iter().count(), 2);
    }

    #[test]
    fn test_return_entry_shapes() {
        let payload: QueryPayload = serde_json::from_value(json!({
            "return": [
                "asset_code",
                {"column": "user_ts", "alias": "ts"},
                {"json": {"column": "reading", "properties": "temperature"}, "alias": "t"}
            ]
        }))
        .unwrap();
        let returns = payload.returns.unwrap();
        assert_eq!(returns.len(), 3);
        assert!(matches!(returns[0], ReturnEntry::Column(_)));
    }

    #[test]
    fn test_where_builder_round_trips() {
        let clause = WhereClause::equals("key", "READINGS").and(WhereClause::new("value", ">", 0));
        let value = serde_json::to_value(&clause).unwrap();
        let back: WhereClause = serde_json::from_value(value).unwrap();
        assert_eq!(back.column, "key");
        assert_eq!(back.and.unwrap().condition, ">");
    }

    #[test]
    fn test_insert_values_preserve_order() {
        let mut values = InsertValues::new();
        values.push("key", "K");
        values.push("description", "d");
        values.push("value", 0);
        let obj = values.to_value();
        let keys: Vec<_> = obj.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["key", "description", "value"]);
    }
}
