//! SQL dialects
//!
//! A dialect quotes identifiers, renders literal values and resolves a
//! comparator into SQL text from already-escaped operands.

use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};

use crate::backends::DatabaseValue;
use crate::config::Timezone;
use crate::sql::comparators::ComparatorOp;

/// Pre-escaped right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedOperand {
    Single(String),
    Range { from: String, to: String },
}

/// Database-specific quoting and comparator rules
pub trait Dialect: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Quote each path segment and join them with `.`
    fn escape_id(&self, segments: &[&str]) -> String;

    /// Render a literal value; dates honor `timezone`
    fn escape_val(&self, value: &DatabaseValue, timezone: &Timezone) -> String;

    /// Render `left OP right` for a comparator
    fn resolve_comparator(&self, left: &str, op: ComparatorOp, right: &RenderedOperand) -> String {
        let right = match right {
            RenderedOperand::Range { from, to } => {
                return match op {
                    ComparatorOp::NotBetween => format!("{} NOT BETWEEN {} AND {}", left, from, to),
                    _ => format!("{} BETWEEN {} AND {}", left, from, to),
                };
            }
            RenderedOperand::Single(right) => right,
        };

        match op {
            ComparatorOp::Eq => format!("{} = {}", left, right),
            ComparatorOp::Ne => format!("{} <> {}", left, right),
            ComparatorOp::Gt => format!("{} > {}", left, right),
            ComparatorOp::Gte => format!("{} >= {}", left, right),
            ComparatorOp::Lt => format!("{} < {}", left, right),
            ComparatorOp::Lte => format!("{} <= {}", left, right),
            ComparatorOp::Like => format!("{} LIKE {}", left, right),
            ComparatorOp::NotLike => format!("{} NOT LIKE {}", left, right),
            ComparatorOp::NotIn => format!("{} <> ALL({})", left, right),
            ComparatorOp::Any => format!("{} = ANY({})", left, right),
            ComparatorOp::NotAny => format!("NOT ({} = ANY({}))", left, right),
            ComparatorOp::Mod => format!("{} % {}", left, right),
            ComparatorOp::Lta => format!("{} @> {}", left, right),
            ComparatorOp::Ltd => format!("{} <@ {}", left, right),
            ComparatorOp::Ltm => format!("{} ~ {}", left, right),
            ComparatorOp::Between => format!("{} BETWEEN {}", left, right),
            ComparatorOp::NotBetween => format!("{} NOT BETWEEN {}", left, right),
            ComparatorOp::Sql => right.clone(),
        }
    }
}

/// PostgreSQL quoting rules
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn escape_id(&self, segments: &[&str]) -> String {
        segments
            .iter()
            .map(|segment| format!("\"{}\"", segment.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn escape_val(&self, value: &DatabaseValue, timezone: &Timezone) -> String {
        match value {
            DatabaseValue::Null => "NULL".to_string(),
            DatabaseValue::Bool(b) => b.to_string(),
            DatabaseValue::Int32(i) => i.to_string(),
            DatabaseValue::Int64(i) => i.to_string(),
            DatabaseValue::Float32(f) if f.is_finite() => f.to_string(),
            DatabaseValue::Float32(f) => format_float(*f as f64),
            DatabaseValue::Float64(f) => format_float(*f),
            DatabaseValue::String(s) => quote(s),
            DatabaseValue::Bytes(b) => format!("'\\x{}'", hex::encode(b)),
            DatabaseValue::Uuid(u) => quote(&u.to_string()),
            DatabaseValue::DateTime(dt) => quote(&date_to_string(dt, timezone)),
            DatabaseValue::Date(d) => quote(&d.format("%Y-%m-%d").to_string()),
            DatabaseValue::Time(t) => quote(&t.to_string()),
            DatabaseValue::Json(j) => quote(&j.to_string()),
            DatabaseValue::Array(items) => quote(&array_literal(items, timezone)),
            DatabaseValue::Point { x, y } => format!("POINT({}, {})", x, y),
        }
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "'NaN'".to_string()
    } else if f == f64::INFINITY {
        "'Infinity'".to_string()
    } else if f == f64::NEG_INFINITY {
        "'-Infinity'".to_string()
    } else {
        f.to_string()
    }
}

/// Format a timestamp. `local` keeps the process' wall clock; any other
/// setting shifts the instant by the configured offset and marks it `Z`.
pub fn date_to_string(dt: &DateTime<Utc>, timezone: &Timezone) -> String {
    match timezone {
        Timezone::Local => dt
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string(),
        other => {
            let shifted = *dt + Duration::minutes(other.offset_minutes().unwrap_or(0) as i64);
            shifted.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
        }
    }
}

/// Render a PostgreSQL array literal body, e.g. `{Jane,"John Doe",NULL}`
pub fn array_literal(items: &[DatabaseValue], timezone: &Timezone) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|item| match item {
            DatabaseValue::Null => "NULL".to_string(),
            DatabaseValue::Bool(b) => b.to_string(),
            DatabaseValue::Int32(i) => i.to_string(),
            DatabaseValue::Int64(i) => i.to_string(),
            DatabaseValue::Float32(f) => f.to_string(),
            DatabaseValue::Float64(f) => f.to_string(),
            DatabaseValue::Array(nested) => array_literal(nested, timezone),
            DatabaseValue::String(s) => array_element(s),
            DatabaseValue::Uuid(u) => u.to_string(),
            DatabaseValue::DateTime(dt) => array_element(&date_to_string(dt, timezone)),
            DatabaseValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            DatabaseValue::Time(t) => array_element(&t.to_string()),
            DatabaseValue::Json(j) => array_element(&j.to_string()),
            DatabaseValue::Bytes(b) => array_element(&format!("\\x{}", hex::encode(b))),
            DatabaseValue::Point { x, y } => array_element(&format!("({},{})", x, y)),
        })
        .collect();

    format!("{{{}}}", elements.join(","))
}

/// Quote an array element when PostgreSQL would otherwise misread it
pub(crate) fn array_element(text: &str) -> String {
    let needs_quotes = text.is_empty()
        || text.eq_ignore_ascii_case("NULL")
        || text
            .chars()
            .any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_whitespace());

    if needs_quotes {
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        text.to_string()
    }
}
