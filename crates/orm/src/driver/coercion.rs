//! Property type coercion
//!
//! `value_to_property` turns a decoded column value into the caller-facing
//! value, `property_to_value` does the reverse before a value is written.
//! Both dispatch on the property's type tag. Coercion never fails: numeric
//! input that does not parse is left alone and JSON that does not parse
//! becomes `Null`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};
use std::sync::Arc;

use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::backends::DatabaseValue;
use crate::config::Timezone;

static POINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\(\s*([^,\s()]+)[\s,]+([^,\s()]+)\s*\)$").expect("valid point regex")
});

/// Type tag of a property
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Object,
    Json,
    Point,
    Array,
    Date,
    Number,
    /// Any other tag; resolved against registered custom types
    Custom(String),
}

impl FromStr for PropertyType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "object" => PropertyType::Object,
            "json" => PropertyType::Json,
            "point" => PropertyType::Point,
            "array" => PropertyType::Array,
            "date" => PropertyType::Date,
            "number" => PropertyType::Number,
            other => PropertyType::Custom(other.to_string()),
        })
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::Object => "object",
            PropertyType::Json => "json",
            PropertyType::Point => "point",
            PropertyType::Array => "array",
            PropertyType::Date => "date",
            PropertyType::Number => "number",
            PropertyType::Custom(name) => name,
        };
        f.write_str(name)
    }
}

/// Element type of an array property. Unquoted elements of a stored array
/// literal decode as this type; quoted elements are always text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArrayElement {
    #[default]
    Text,
    Int4,
    Int8,
    Float4,
    Float8,
    Bool,
}

/// A model property as the driver sees it
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    /// Storage column name
    pub maps_to: String,
    pub property_type: PropertyType,
    /// Part of the primary key
    pub key: bool,
    /// Element type when `property_type` is `Array`
    pub element: ArrayElement,
}

impl Property {
    pub fn new(name: &str, property_type: PropertyType) -> Self {
        Self {
            name: name.to_string(),
            maps_to: name.to_string(),
            property_type,
            key: false,
            element: ArrayElement::default(),
        }
    }

    pub fn maps_to(mut self, column: &str) -> Self {
        self.maps_to = column.to_string();
        self
    }

    pub fn as_key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn elements(mut self, element: ArrayElement) -> Self {
        self.element = element;
        self
    }
}

/// Coercion rules for a custom property type. Missing directions are identity.
pub trait CustomType: Send + Sync {
    fn value_to_property(&self, value: DatabaseValue) -> DatabaseValue {
        value
    }

    fn property_to_value(&self, value: DatabaseValue) -> DatabaseValue {
        value
    }
}

/// Timezone-aware coercion with a table of custom types
#[derive(Clone, Default)]
pub struct TypeCoercer {
    timezone: Timezone,
    custom_types: HashMap<String, Arc<dyn CustomType>>,
}

impl TypeCoercer {
    pub fn new(timezone: Timezone) -> Self {
        Self {
            timezone,
            custom_types: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, custom: Arc<dyn CustomType>) {
        self.custom_types.insert(name.to_string(), custom);
    }

    pub fn custom_types(&self) -> &HashMap<String, Arc<dyn CustomType>> {
        &self.custom_types
    }

    /// Storage to caller
    pub fn value_to_property(&self, value: DatabaseValue, property: &Property) -> DatabaseValue {
        match &property.property_type {
            PropertyType::Object => parse_object(value),
            PropertyType::Json => parse_json(value),
            PropertyType::Point => parse_point(value),
            PropertyType::Array => parse_array(value, property.element),
            PropertyType::Date => self.shift_date(value, -1),
            PropertyType::Number => to_number(value),
            PropertyType::Custom(name) => match self.custom_types.get(name) {
                Some(custom) => custom.value_to_property(value),
                None => value,
            },
        }
    }

    /// Caller to storage
    pub fn property_to_value(&self, value: DatabaseValue, property: &Property) -> DatabaseValue {
        match &property.property_type {
            PropertyType::Object => match value {
                DatabaseValue::Null | DatabaseValue::Bytes(_) => value,
                other => DatabaseValue::Bytes(other.to_json().to_string().into_bytes()),
            },
            PropertyType::Json => match value {
                DatabaseValue::Null => value,
                other => DatabaseValue::String(other.to_json().to_string()),
            },
            PropertyType::Point => match value {
                DatabaseValue::Json(JsonValue::Object(map)) => {
                    match (map.get("x").and_then(JsonValue::as_f64), map.get("y").and_then(JsonValue::as_f64)) {
                        (Some(x), Some(y)) => DatabaseValue::Point { x, y },
                        _ => DatabaseValue::Json(JsonValue::Object(map)),
                    }
                }
                other => other,
            },
            PropertyType::Array => match value {
                DatabaseValue::Array(items) => DatabaseValue::String(encode_array(&items)),
                other => other,
            },
            PropertyType::Date => self.shift_date(value, 1),
            PropertyType::Number => to_number(value),
            PropertyType::Custom(name) => match self.custom_types.get(name) {
                Some(custom) => custom.property_to_value(value),
                None => value,
            },
        }
    }

    /// Storage keeps the configured zone's wall clock. Reading subtracts the
    /// offset, writing adds it; local and unrecognized zones leave dates alone.
    fn shift_date(&self, value: DatabaseValue, direction: i64) -> DatabaseValue {
        match (value, self.timezone.offset_minutes()) {
            (DatabaseValue::DateTime(dt), Some(offset)) => {
                DatabaseValue::DateTime(dt + Duration::minutes(direction * offset as i64))
            }
            (value, _) => value,
        }
    }
}

impl fmt::Debug for TypeCoercer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.custom_types.keys().collect();
        names.sort();
        f.debug_struct("TypeCoercer")
            .field("timezone", &self.timezone)
            .field("custom_types", &names)
            .finish()
    }
}

fn parse_object(value: DatabaseValue) -> DatabaseValue {
    match value {
        DatabaseValue::Bytes(bytes) => serde_json::from_slice::<JsonValue>(&bytes)
            .map(DatabaseValue::Json)
            .unwrap_or(DatabaseValue::Null),
        other => parse_json(other),
    }
}

fn parse_json(value: DatabaseValue) -> DatabaseValue {
    match value {
        DatabaseValue::String(text) => serde_json::from_str::<JsonValue>(&text)
            .map(DatabaseValue::Json)
            .unwrap_or(DatabaseValue::Null),
        other => other,
    }
}

fn parse_point(value: DatabaseValue) -> DatabaseValue {
    let text = match &value {
        DatabaseValue::String(text) => text,
        _ => return value,
    };

    let parsed = POINT.captures(text.trim()).and_then(|caps| {
        let x = caps[1].parse::<f64>().ok()?;
        let y = caps[2].parse::<f64>().ok()?;
        Some(DatabaseValue::Point { x, y })
    });
    parsed.unwrap_or(value)
}

fn to_number(value: DatabaseValue) -> DatabaseValue {
    match value {
        DatabaseValue::Bool(b) => DatabaseValue::Int32(b as i32),
        DatabaseValue::String(text) => match parse_number(text.trim()) {
            Some(number) => number,
            None => DatabaseValue::String(text),
        },
        other => other,
    }
}

fn parse_number(text: &str) -> Option<DatabaseValue> {
    if text.is_empty() {
        return None;
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(match i32::try_from(int) {
            Ok(small) => DatabaseValue::Int32(small),
            Err(_) => DatabaseValue::Int64(int),
        });
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(DatabaseValue::Float64)
}

/// Brace-delimited literal with every text element double-quoted. Floats
/// always carry a fraction or exponent so they read back as floats.
fn encode_array(items: &[DatabaseValue]) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|item| match item {
            DatabaseValue::Null => "NULL".to_string(),
            DatabaseValue::Bool(b) => b.to_string(),
            DatabaseValue::Int32(i) => i.to_string(),
            DatabaseValue::Int64(i) => i.to_string(),
            DatabaseValue::Float32(f) if f.is_finite() => format!("{:?}", f),
            DatabaseValue::Float32(f) => special_float(*f as f64),
            DatabaseValue::Float64(f) if f.is_finite() => format!("{:?}", f),
            DatabaseValue::Float64(f) => special_float(*f),
            DatabaseValue::Array(nested) => encode_array(nested),
            DatabaseValue::String(s) => quote_element(s),
            other => match other.to_json() {
                JsonValue::String(s) => quote_element(&s),
                json => quote_element(&json.to_string()),
            },
        })
        .collect();

    format!("{{{}}}", elements.join(","))
}

fn special_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f > 0.0 {
        "Infinity".to_string()
    } else {
        "-Infinity".to_string()
    }
}

fn quote_element(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn parse_array(value: DatabaseValue, element: ArrayElement) -> DatabaseValue {
    let text = match &value {
        DatabaseValue::String(text) => text.trim(),
        _ => return value,
    };

    let mut chars = text.chars().peekable();
    if chars.next() != Some('{') {
        return value;
    }
    match parse_elements(&mut chars, element) {
        Some(items) if chars.next().is_none() => DatabaseValue::Array(items),
        _ => value,
    }
}

/// Elements after an opening brace, through the matching closing brace
fn parse_elements(chars: &mut Peekable<Chars<'_>>, element: ArrayElement) -> Option<Vec<DatabaseValue>> {
    let mut items = Vec::new();
    if chars.peek() == Some(&'}') {
        chars.next();
        return Some(items);
    }

    loop {
        let item = match *chars.peek()? {
            '{' => {
                chars.next();
                DatabaseValue::Array(parse_elements(chars, element)?)
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next()? {
                        '\\' => text.push(chars.next()?),
                        '"' => break,
                        c => text.push(c),
                    }
                }
                DatabaseValue::String(text)
            }
            _ => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ',' || c == '}' {
                        break;
                    }
                    text.push(c);
                    chars.next();
                }
                unquoted_element(text.trim(), element)
            }
        };
        items.push(item);

        match chars.next()? {
            ',' => continue,
            '}' => return Some(items),
            _ => return None,
        }
    }
}

fn unquoted_element(text: &str, element: ArrayElement) -> DatabaseValue {
    if text.eq_ignore_ascii_case("NULL") {
        return DatabaseValue::Null;
    }

    let typed = match element {
        ArrayElement::Text => None,
        ArrayElement::Int4 => text.parse().ok().map(DatabaseValue::Int32),
        ArrayElement::Int8 => text.parse().ok().map(DatabaseValue::Int64),
        // PostgreSQL spells special floats NaN, Infinity and -Infinity
        ArrayElement::Float4 => text.parse().ok().map(DatabaseValue::Float32),
        ArrayElement::Float8 => text.parse().ok().map(DatabaseValue::Float64),
        ArrayElement::Bool => match text {
            "t" | "true" => Some(DatabaseValue::Bool(true)),
            "f" | "false" => Some(DatabaseValue::Bool(false)),
            _ => None,
        },
    };
    typed.unwrap_or_else(|| DatabaseValue::String(text.to_string()))
}
