//! Query Builder - Core builder implementation

use std::sync::Arc;

use super::types::*;
use crate::config::Timezone;
use crate::error::{OrmError, OrmResult};
use crate::sql::dialect::Dialect;

/// Chainable SELECT builder.
///
/// State accumulates through the chained calls and is compiled in one pass
/// by [`SelectQuery::build`]. Pending prefix functions (`count()`, `sum()`,
/// ...) are flushed by `build`, so building twice after leaving one pending
/// is not guaranteed to give the same text.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub(crate) dialect: Arc<dyn Dialect>,
    pub(crate) timezone: Timezone,
    pub(crate) from: Vec<FromEntry>,
    pub(crate) where_groups: Vec<WhereGroup>,
    pub(crate) order: Vec<OrderItem>,
    pub(crate) group_by: Option<Vec<String>>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) distinct_on: Option<Vec<String>>,
    pub(crate) format: Format,
    pub(crate) transform: Option<Transform>,
    pub(crate) where_exists: bool,
    pub(crate) fun_stack: Vec<Aggregate>,
    /// Misuse recorded by an infallible chain method, reported by `build`
    pub(crate) deferred_error: Option<String>,
}

impl SelectQuery {
    pub fn new(dialect: Arc<dyn Dialect>, timezone: Timezone) -> Self {
        Self {
            dialect,
            timezone,
            from: Vec::new(),
            where_groups: Vec::new(),
            order: Vec::new(),
            group_by: None,
            limit: None,
            offset: None,
            distinct_on: None,
            format: Format::Rows,
            transform: None,
            where_exists: false,
            fun_stack: Vec::new(),
            deferred_error: None,
        }
    }

    pub(crate) fn defer_error(&mut self, message: impl Into<String>) {
        if self.deferred_error.is_none() {
            self.deferred_error = Some(message.into());
        }
    }

    pub(crate) fn check_deferred(&self) -> OrmResult<()> {
        match &self.deferred_error {
            Some(message) => Err(OrmError::Query(message.clone())),
            None => Ok(()),
        }
    }

    /// Alias for a table name or an already assigned alias
    pub(crate) fn resolve_alias(&self, table: &str) -> OrmResult<String> {
        self.from
            .iter()
            .find(|entry| entry.table == table)
            .or_else(|| self.from.iter().find(|entry| entry.alias == table))
            .map(|entry| entry.alias.clone())
            .ok_or_else(|| OrmError::UnknownTableReference(table.to_string()))
    }

    /// Whether tables render with aliases and columns alias-qualified
    pub(crate) fn is_aliased(&self) -> bool {
        self.from.len() > 1 || self.where_exists
    }

    pub fn tables(&self) -> &[FromEntry] {
        &self.from
    }

    pub fn timezone(&self) -> &Timezone {
        &self.timezone
    }
}
