//! Query Builder Module - chainable SQL construction over a dialect

pub mod builder;
pub mod conditions;
pub mod dml;
pub mod joins;
pub mod ordering;
pub mod pagination;
pub mod select;
pub mod sql_generation;
pub mod types;
pub mod where_clause;

use std::sync::Arc;

pub use builder::SelectQuery;
pub use conditions::{BoolOp, ConditionValue, Conditions};
pub use dml::{InsertQuery, RemoveQuery, UpdateQuery};
pub use types::{Aggregate, Format, FunArg, JoinColumn, JoinKeys, LinkColumns, OrderDirection, SelectItem};
pub use where_clause::WhereRenderer;

use crate::backends::DatabaseValue;
use crate::config::Timezone;
use crate::error::OrmResult;
use crate::sql::dialect::{Dialect, PostgresDialect};
use crate::sql::helpers::escape_query;

/// Entry point handing out builders bound to one dialect and timezone
#[derive(Debug, Clone)]
pub struct Query {
    dialect: Arc<dyn Dialect>,
    timezone: Timezone,
}

impl Query {
    pub fn new(dialect: Arc<dyn Dialect>, timezone: Timezone) -> Self {
        Self { dialect, timezone }
    }

    pub fn postgres(timezone: Timezone) -> Self {
        Self::new(Arc::new(PostgresDialect::new()), timezone)
    }

    pub fn select(&self) -> SelectQuery {
        SelectQuery::new(self.dialect.clone(), self.timezone.clone())
    }

    pub fn insert(&self) -> InsertQuery {
        InsertQuery::new(self.dialect.clone(), self.timezone.clone())
    }

    pub fn update(&self) -> UpdateQuery {
        UpdateQuery::new(self.dialect.clone(), self.timezone.clone())
    }

    pub fn remove(&self) -> RemoveQuery {
        RemoveQuery::new(self.dialect.clone(), self.timezone.clone())
    }

    pub fn escape_id(&self, segments: &[&str]) -> String {
        self.dialect.escape_id(segments)
    }

    pub fn escape_val(&self, value: &DatabaseValue) -> String {
        self.dialect.escape_val(value, &self.timezone)
    }

    /// Fill `??` and `?` placeholders of a raw statement
    pub fn escape(&self, sql: &str, args: &[DatabaseValue]) -> OrmResult<String> {
        escape_query(self.dialect.as_ref(), sql, args, &self.timezone)
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn timezone(&self) -> &Timezone {
        &self.timezone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_shares_timezone() {
        let query = Query::postgres(Timezone::Offset(0));
        assert_eq!(query.select().timezone(), &Timezone::Offset(0));
        assert_eq!(query.dialect().name(), "postgresql");
        assert_eq!(query.escape("?? = ?", &["a".into(), 1.into()]).unwrap(), "\"a\" = 1");
    }
}
