//! Core Database Backend Traits
//!
//! Values, result rows, and the transport boundary every driver executes
//! through. A transport is a black box that connects, runs one statement of
//! SQL text, and disconnects; everything above it deals only in SQL strings.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::config::{ConnectionConfig, DriverOptions};
use crate::connection::PoolRegistry;
use crate::error::{OrmError, OrmResult};
use crate::sql::dialect::Dialect;

/// Callback invoked with out-of-band connection errors
pub type ErrorHandler = Arc<dyn Fn(&OrmError) + Send + Sync>;

/// The transport boundary consumed by the driver.
///
/// There are exactly two strategies: a shared pool that borrows a connection
/// per statement, and an exclusively owned client connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection. Idempotent for pooled transports.
    async fn connect(&self) -> OrmResult<()>;

    /// Execute one statement and return its rows exactly as decoded
    async fn query(&self, sql: &str) -> OrmResult<Vec<Row>>;

    /// Tear the transport down. Pooled transports never close the shared pool.
    async fn close(&self) -> OrmResult<()>;

    /// Whether statements borrow from a shared pool
    fn is_pooled(&self) -> bool;

    /// Subscribe to out-of-band connection errors
    fn on_error(&self, handler: ErrorHandler);
}

/// A named database backend: its SQL dialect plus a way to open transports
pub trait DatabaseAdapter: Send + Sync {
    /// Canonical adapter name
    fn name(&self) -> &'static str;

    fn dialect(&self) -> Arc<dyn Dialect>;

    /// Open the transport selected by `options.pool`. Pooled transports come
    /// out of `pools` so equal configurations share one pool.
    fn create_transport(
        &self,
        config: &ConnectionConfig,
        options: &DriverOptions,
        pools: &PoolRegistry,
    ) -> OrmResult<Arc<dyn Transport>>;
}

/// One result row: ordered column names mapped to decoded values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column insertion
    pub fn with(mut self, column: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Insert a column, replacing an earlier column with the same name
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<DatabaseValue>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter().position(|c| *c == column) {
            Some(index) => self.values[index] = value,
            None => {
                self.columns.push(column);
                self.values.push(value);
            }
        }
    }

    /// Get a column value by name
    pub fn get(&self, column: &str) -> Option<&DatabaseValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|index| &self.values[index])
    }

    /// Get a column value by index
    pub fn get_by_index(&self, index: usize) -> Option<&DatabaseValue> {
        self.values.get(index)
    }

    /// Deserialize a column into a typed value
    pub fn get_as<T>(&self, column: &str) -> OrmResult<T>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let value = self
            .get(column)
            .ok_or_else(|| OrmError::Query(format!("Column '{}' not found", column)))?;
        Ok(serde_json::from_value(value.to_json())?)
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatabaseValue)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Convert row to JSON object
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .iter()
            .map(|(column, value)| (column.to_string(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        JsonValue::Object(map)
    }
}

impl<K: Into<String>> FromIterator<(K, DatabaseValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, DatabaseValue)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

/// Database value enumeration used for literals, rows and coercion
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Json(JsonValue),
    Array(Vec<DatabaseValue>),
    /// Geometric point, rendered as `POINT(x, y)`
    Point { x: f64, y: f64 },
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Int64(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Float32(f) => serde_json::Number::from_f64(*f as f64)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::Array(
                b.iter()
                    .map(|&x| JsonValue::Number(serde_json::Number::from(x)))
                    .collect(),
            ),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Date(d) => JsonValue::String(d.to_string()),
            DatabaseValue::Time(t) => JsonValue::String(t.to_string()),
            DatabaseValue::Json(j) => j.clone(),
            DatabaseValue::Array(arr) => JsonValue::Array(arr.iter().map(|v| v.to_json()).collect()),
            DatabaseValue::Point { x, y } => serde_json::json!({ "x": x, "y": y }),
        }
    }

    /// Create DatabaseValue from JSON value. Objects stay JSON, strings stay text.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => DatabaseValue::Null,
            JsonValue::Bool(b) => DatabaseValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
                        DatabaseValue::Int32(i as i32)
                    } else {
                        DatabaseValue::Int64(i)
                    }
                } else if let Some(f) = n.as_f64() {
                    DatabaseValue::Float64(f)
                } else {
                    DatabaseValue::Null
                }
            }
            JsonValue::String(s) => DatabaseValue::String(s),
            JsonValue::Array(arr) => {
                DatabaseValue::Array(arr.into_iter().map(DatabaseValue::from_json).collect())
            }
            JsonValue::Object(_) => DatabaseValue::Json(json),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f32> for DatabaseValue {
    fn from(value: f32) -> Self {
        DatabaseValue::Float32(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl From<uuid::Uuid> for DatabaseValue {
    fn from(value: uuid::Uuid) -> Self {
        DatabaseValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DatabaseValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<chrono::NaiveDate> for DatabaseValue {
    fn from(value: chrono::NaiveDate) -> Self {
        DatabaseValue::Date(value)
    }
}

impl From<chrono::NaiveTime> for DatabaseValue {
    fn from(value: chrono::NaiveTime) -> Self {
        DatabaseValue::Time(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl From<Vec<DatabaseValue>> for DatabaseValue {
    fn from(value: Vec<DatabaseValue>) -> Self {
        DatabaseValue::Array(value)
    }
}

impl From<Vec<&str>> for DatabaseValue {
    fn from(value: Vec<&str>) -> Self {
        DatabaseValue::Array(value.into_iter().map(DatabaseValue::from).collect())
    }
}

impl From<Vec<String>> for DatabaseValue {
    fn from(value: Vec<String>) -> Self {
        DatabaseValue::Array(value.into_iter().map(DatabaseValue::from).collect())
    }
}

impl From<Vec<i32>> for DatabaseValue {
    fn from(value: Vec<i32>) -> Self {
        DatabaseValue::Array(value.into_iter().map(DatabaseValue::from).collect())
    }
}

impl From<Vec<i64>> for DatabaseValue {
    fn from(value: Vec<i64>) -> Self {
        DatabaseValue::Array(value.into_iter().map(DatabaseValue::from).collect())
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_preserves_order_and_replaces_duplicates() {
        let mut row = Row::new().with("id", 1).with("name", "Jane");
        row.insert("id", 2);

        assert_eq!(row.column_names(), &["id".to_string(), "name".to_string()]);
        assert_eq!(row.get("id"), Some(&DatabaseValue::Int32(2)));
        assert_eq!(row.get_by_index(1), Some(&DatabaseValue::String("Jane".into())));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn test_row_typed_access() {
        let row = Row::new().with("age", 42i64).with("name", "John");
        let age: i64 = row.get_as("age").unwrap();
        let name: String = row.get_as("name").unwrap();
        assert_eq!(age, 42);
        assert_eq!(name, "John");
        assert!(row.get_as::<i64>("nope").is_err());
    }

    #[test]
    fn test_from_json_keeps_text_as_text() {
        let value = DatabaseValue::from_json(serde_json::json!("2024-01-01T00:00:00Z"));
        assert_eq!(value, DatabaseValue::String("2024-01-01T00:00:00Z".into()));

        let value = DatabaseValue::from_json(serde_json::json!([1, 5_000_000_000i64]));
        assert_eq!(
            value,
            DatabaseValue::Array(vec![DatabaseValue::Int32(1), DatabaseValue::Int64(5_000_000_000)])
        );
    }

    #[test]
    fn test_point_to_json() {
        let point = DatabaseValue::Point { x: 1.5, y: -2.0 };
        assert_eq!(point.to_json(), serde_json::json!({ "x": 1.5, "y": -2.0 }));
    }
}
