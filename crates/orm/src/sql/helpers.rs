//! Placeholder escaping for raw SQL fragments

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::backends::DatabaseValue;
use crate::config::Timezone;
use crate::error::{OrmError, OrmResult};
use crate::sql::comparators::RawSql;
use crate::sql::dialect::Dialect;

static QUERY_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?{1,2}").expect("valid regex"));
static RAW_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?:(id|value)").expect("valid regex"));

/// Replace `??` with escaped identifiers and `?` with escaped values, in order
pub fn escape_query(
    dialect: &dyn Dialect,
    query: &str,
    args: &[DatabaseValue],
    timezone: &Timezone,
) -> OrmResult<String> {
    let mut position = 0;
    let mut missing = None;

    let rendered = QUERY_PLACEHOLDER.replace_all(query, |caps: &Captures| {
        let arg = args.get(position);
        position += 1;

        match (&caps[0], arg) {
            ("??", Some(arg)) => dialect.escape_id(&[&identifier_text(arg)]),
            ("??", None) => {
                missing.get_or_insert(position);
                String::new()
            }
            (_, Some(arg)) => dialect.escape_val(arg, timezone),
            (_, None) => dialect.escape_val(&DatabaseValue::Null, timezone),
        }
    });

    match missing {
        Some(position) => Err(OrmError::Query(format!(
            "missing identifier argument #{} for '{}'",
            position, query
        ))),
        None => Ok(rendered.into_owned()),
    }
}

/// Fill a raw comparator template. `?:column` becomes `column`; each
/// `?:id`/`?:value` consumes the next escape, or vanishes once they run out.
pub fn fill_raw_sql(dialect: &dyn Dialect, raw: &RawSql, column: &str, timezone: &Timezone) -> String {
    let template = raw.template.replacen("?:column", column, 1);
    let mut escapes = raw.escapes.iter();

    RAW_PLACEHOLDER
        .replace_all(&template, |caps: &Captures| match escapes.next() {
            None => String::new(),
            Some(value) if &caps[1] == "id" => dialect.escape_id(&[&identifier_text(value)]),
            Some(value) => dialect.escape_val(value, timezone),
        })
        .into_owned()
}

/// Text of a value used where an identifier is expected
pub(crate) fn identifier_text(value: &DatabaseValue) -> String {
    match value {
        DatabaseValue::String(s) => s.clone(),
        other => match other.to_json() {
            serde_json::Value::String(s) => s,
            json => json.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::dialect::PostgresDialect;

    #[test]
    fn test_escape_query() {
        let sql = escape_query(
            &PostgresDialect,
            "LOWER(??) = ? OR ?? > ?",
            &["name".into(), "o'neil".into(), "age".into(), 3.into()],
            &Timezone::Local,
        )
        .unwrap();
        assert_eq!(sql, "LOWER(\"name\") = 'o''neil' OR \"age\" > 3");
    }

    #[test]
    fn test_escape_query_missing_args() {
        let sql = escape_query(&PostgresDialect, "a = ?", &[], &Timezone::Local).unwrap();
        assert_eq!(sql, "a = NULL");

        let err = escape_query(&PostgresDialect, "??", &[], &Timezone::Local).unwrap_err();
        assert!(matches!(err, OrmError::Query(_)));
    }

    #[test]
    fn test_fill_raw_sql() {
        let raw = RawSql {
            template: "LOWER(?:column) LIKE ?:value AND ?:id IS NOT NULL AND ?:value".to_string(),
            escapes: vec!["%jo%".into(), "email".into()],
        };
        let sql = fill_raw_sql(&PostgresDialect, &raw, "\"t1\".\"name\"", &Timezone::Local);
        assert_eq!(sql, "LOWER(\"t1\".\"name\") LIKE '%jo%' AND \"email\" IS NOT NULL AND ");
    }
}
