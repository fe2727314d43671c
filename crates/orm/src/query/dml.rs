//! Query Builder DML operations (INSERT, UPDATE, DELETE)

use std::sync::Arc;

use super::conditions::Conditions;
use super::types::WhereGroup;
use super::where_clause::WhereRenderer;
use crate::backends::DatabaseValue;
use crate::config::Timezone;
use crate::error::{OrmError, OrmResult};
use crate::sql::dialect::Dialect;

/// INSERT builder
#[derive(Debug, Clone)]
pub struct InsertQuery {
    dialect: Arc<dyn Dialect>,
    timezone: Timezone,
    table: Option<String>,
    values: Vec<(String, DatabaseValue)>,
}

impl InsertQuery {
    pub fn new(dialect: Arc<dyn Dialect>, timezone: Timezone) -> Self {
        Self {
            dialect,
            timezone,
            table: None,
            values: Vec::new(),
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    /// Set a column value
    pub fn set(mut self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        set_value(&mut self.values, column, value.into());
        self
    }

    /// Set multiple values at once
    pub fn set_values<I, K>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, DatabaseValue)>,
        K: Into<String>,
    {
        for (column, value) in values {
            set_value(&mut self.values, &column.into(), value);
        }
        self
    }

    pub fn build(&self) -> OrmResult<String> {
        let table = target_table(&self.table, "insert")?;
        let table = self.dialect.escape_id(&[table]);

        if self.values.is_empty() {
            return Ok(format!("INSERT INTO {} DEFAULT VALUES", table));
        }

        let columns: Vec<String> = self
            .values
            .iter()
            .map(|(column, _)| self.dialect.escape_id(&[column]))
            .collect();
        let values: Vec<String> = self
            .values
            .iter()
            .map(|(_, value)| self.dialect.escape_val(value, &self.timezone))
            .collect();

        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            values.join(", ")
        ))
    }
}

/// UPDATE builder
#[derive(Debug, Clone)]
pub struct UpdateQuery {
    dialect: Arc<dyn Dialect>,
    timezone: Timezone,
    table: Option<String>,
    changes: Vec<(String, DatabaseValue)>,
    where_groups: Vec<WhereGroup>,
}

impl UpdateQuery {
    pub fn new(dialect: Arc<dyn Dialect>, timezone: Timezone) -> Self {
        Self {
            dialect,
            timezone,
            table: None,
            changes: Vec::new(),
            where_groups: Vec::new(),
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn set(mut self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        set_value(&mut self.changes, column, value.into());
        self
    }

    pub fn set_values<I, K>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, DatabaseValue)>,
        K: Into<String>,
    {
        for (column, value) in values {
            set_value(&mut self.changes, &column.into(), value);
        }
        self
    }

    pub fn where_conditions(mut self, conditions: Conditions) -> Self {
        self.where_groups.push(WhereGroup::new(None, conditions));
        self
    }

    pub fn build(&self) -> OrmResult<String> {
        let table = target_table(&self.table, "update")?;
        if self.changes.is_empty() {
            return Err(OrmError::Query(format!("update of '{}' has no changes", table)));
        }

        let assignments: Vec<String> = self
            .changes
            .iter()
            .map(|(column, value)| {
                format!(
                    "{} = {}",
                    self.dialect.escape_id(&[column]),
                    self.dialect.escape_val(value, &self.timezone)
                )
            })
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.escape_id(&[table]),
            assignments.join(", ")
        );
        if let Some(where_clause) = WhereRenderer::new(self.dialect.as_ref(), &self.timezone)
            .unqualified()
            .render(&self.where_groups)
        {
            sql.push(' ');
            sql.push_str(&where_clause);
        }
        Ok(sql)
    }
}

/// DELETE builder
#[derive(Debug, Clone)]
pub struct RemoveQuery {
    dialect: Arc<dyn Dialect>,
    timezone: Timezone,
    table: Option<String>,
    where_groups: Vec<WhereGroup>,
}

impl RemoveQuery {
    pub fn new(dialect: Arc<dyn Dialect>, timezone: Timezone) -> Self {
        Self {
            dialect,
            timezone,
            table: None,
            where_groups: Vec::new(),
        }
    }

    pub fn from(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn where_conditions(mut self, conditions: Conditions) -> Self {
        self.where_groups.push(WhereGroup::new(None, conditions));
        self
    }

    pub fn build(&self) -> OrmResult<String> {
        let table = target_table(&self.table, "delete")?;
        let mut sql = format!("DELETE FROM {}", self.dialect.escape_id(&[table]));

        if let Some(where_clause) = WhereRenderer::new(self.dialect.as_ref(), &self.timezone)
            .unqualified()
            .render(&self.where_groups)
        {
            sql.push(' ');
            sql.push_str(&where_clause);
        }
        Ok(sql)
    }
}

fn set_value(values: &mut Vec<(String, DatabaseValue)>, column: &str, value: DatabaseValue) {
    match values.iter_mut().find(|(existing, _)| existing == column) {
        Some((_, slot)) => *slot = value,
        None => values.push((column.to_string(), value)),
    }
}

fn target_table<'a>(table: &'a Option<String>, statement: &str) -> OrmResult<&'a str> {
    table
        .as_deref()
        .ok_or_else(|| OrmError::Query(format!("{} statement has no table", statement)))
}
