//! Driver data operations
//!
//! Each operation compiles one statement with the driver's [`Query`]
//! factory and executes it. The `*_sql` variants return the statement
//! without executing it.
//!
//! [`Query`]: crate::query::Query

use serde_json::Value as JsonValue;

use super::coercion::Property;
use super::Driver;
use crate::backends::{DatabaseValue, Row};
use crate::error::{OrmError, OrmResult};
use crate::query::{Conditions, Format, JoinKeys, LinkColumns, OrderDirection, SelectQuery};

/// A joined table in a find or count
#[derive(Debug, Clone)]
pub struct JoinSpec {
    /// Table being joined
    pub to_table: String,
    pub to_fields: JoinKeys,
    /// Table or alias it joins against
    pub from_table: String,
    pub from_fields: JoinKeys,
    /// Alias of the joined table; `jN` (1-based) when absent
    pub to_alias: Option<String>,
    /// Conditions qualified by the joined table's alias
    pub conditions: Option<Conditions>,
}

impl JoinSpec {
    pub fn new(
        to_table: &str,
        to_fields: impl Into<JoinKeys>,
        from_table: &str,
        from_fields: impl Into<JoinKeys>,
    ) -> Self {
        Self {
            to_table: to_table.to_string(),
            to_fields: to_fields.into(),
            from_table: from_table.to_string(),
            from_fields: from_fields.into(),
            to_alias: None,
            conditions: None,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.to_alias = Some(alias.to_string());
        self
    }

    pub fn conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }
}

/// Many-to-many through table merged into a find
#[derive(Debug, Clone)]
pub struct MergeSpec {
    /// Through table, joined against the previous table
    pub from_table: String,
    pub from_field: JoinKeys,
    pub to_field: JoinKeys,
    /// Columns selected from the through table
    pub select: Vec<String>,
    /// Table whose alias qualifies the main conditions
    pub table: Option<String>,
    /// Extra conditions on a given table, applied before the main ones
    pub filter: Option<(String, Conditions)>,
}

/// Correlated `EXISTS` filter
#[derive(Debug, Clone)]
pub struct ExistsFilter {
    pub table: String,
    pub link: LinkColumns,
    pub conditions: Conditions,
}

/// One ORDER BY entry
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub column: String,
    pub direction: OrderDirection,
    /// Qualify the column with this table's alias
    pub table: Option<String>,
}

impl OrderSpec {
    /// `-column` sorts descending
    pub fn new(column: &str) -> Self {
        match column.strip_prefix('-') {
            Some(column) => Self::desc(column),
            None => Self::asc(column),
        }
    }

    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: OrderDirection::Asc,
            table: None,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            direction: OrderDirection::Desc,
            ..Self::asc(column)
        }
    }

    pub fn on_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub order: Vec<OrderSpec>,
    pub joins: Vec<JoinSpec>,
    pub merge: Option<MergeSpec>,
    pub exists: Vec<ExistsFilter>,
    pub distinct_on: Option<Vec<String>>,
    pub format: Format,
    /// Function applied to the JSON aggregate, with its extra arguments
    pub transform: Option<(String, Option<JsonValue>)>,
}

#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    pub joins: Vec<JoinSpec>,
    pub merge: Option<MergeSpec>,
    pub exists: Vec<ExistsFilter>,
}

/// Association loaded for many parents at once
#[derive(Debug, Clone)]
pub struct EagerAssociation {
    /// Table holding the associated rows
    pub model_table: String,
    /// Link table between parents and associated rows
    pub merge_table: String,
    /// Link-table column holding the parent key
    pub parent_field: String,
    /// Link-table columns pointing at the associated rows
    pub merge_assoc_fields: Vec<String>,
    /// Key columns of the associated table
    pub model_keys: Vec<String>,
}

/// Column alias carrying the parent key in eager-loaded rows
pub const PARENT_KEY_ALIAS: &str = "$p";

impl Driver {
    /// Select rows from `table`
    pub async fn find(
        &self,
        fields: &[&str],
        table: &str,
        conditions: Conditions,
        options: FindOptions,
    ) -> OrmResult<Vec<Row>> {
        let sql = self.find_sql(fields, table, conditions, options)?;
        self.execute(&sql).await
    }

    pub fn find_sql(
        &self,
        fields: &[&str],
        table: &str,
        conditions: Conditions,
        options: FindOptions,
    ) -> OrmResult<String> {
        let mut query = self.query().select().from(table).select(fields.iter().copied());
        query = apply_joins(query, options.joins.iter())?;

        if let Some(offset) = options.offset.filter(|offset| *offset > 0) {
            query = query.offset(offset);
        }
        if let Some(limit) = options.limit {
            query = query.limit(limit);
        }

        for order in &options.order {
            query = match &order.table {
                Some(order_table) => query.order_by_table(order_table, &order.column, order.direction)?,
                None => query.order(&order.column, order.direction),
            };
        }

        if let Some(columns) = options.distinct_on {
            query = query.distinct_on(columns);
        }

        if let Some(merge) = &options.merge {
            query = query
                .join_last(&merge.from_table, merge.from_field.clone(), merge.to_field.clone())?
                .select(merge.select.iter().map(String::as_str));
        }
        query = apply_filters(query, table, !options.joins.is_empty(), options.merge, conditions)?;
        for exists in options.exists {
            query = query.where_exists(&exists.table, table, exists.link, exists.conditions)?;
        }

        query = query.format(options.format);
        if let Some((function, args)) = options.transform {
            query = query.transform(&function, args);
        }

        query.build()
    }

    /// Count rows of `table` matching `conditions`
    pub async fn count(&self, table: &str, conditions: Conditions, options: CountOptions) -> OrmResult<i64> {
        let sql = self.count_sql(table, conditions, options)?;
        let rows = self.execute(&sql).await?;

        match rows.first().and_then(|row| row.get("c")) {
            Some(DatabaseValue::Int64(count)) => Ok(*count),
            Some(DatabaseValue::Int32(count)) => Ok(*count as i64),
            Some(DatabaseValue::String(text)) => text
                .parse()
                .map_err(|_| OrmError::Query(format!("count returned non-numeric '{}'", text))),
            _ => Ok(0),
        }
    }

    pub fn count_sql(&self, table: &str, conditions: Conditions, options: CountOptions) -> OrmResult<String> {
        let mut query = self.query().select().from(table);
        query = apply_joins(query, options.joins.iter())?;

        if let Some(merge) = &options.merge {
            query = query.join_last(&merge.from_table, merge.from_field.clone(), merge.to_field.clone())?;
        }
        query = apply_filters(query, table, !options.joins.is_empty(), options.merge, conditions)?;
        for exists in options.exists {
            query = query.where_exists(&exists.table, table, exists.link, exists.conditions)?;
        }

        query.build_count()
    }

    /// Insert one row and report the key properties' resolved values.
    ///
    /// Keys come from the row returned by `RETURNING *`. When no row comes
    /// back (a conflict-ignored insert) the supplied values are used.
    pub async fn insert(&self, table: &str, data: &Row, keys: &[Property]) -> OrmResult<Row> {
        let sql = self.insert_sql(table, data)?;
        let rows = self.execute(&sql).await?;
        Ok(resolve_keys(rows.first(), data, keys))
    }

    pub fn insert_sql(&self, table: &str, data: &Row) -> OrmResult<String> {
        let sql = self
            .query()
            .insert()
            .table(table)
            .set_values(data.iter().map(|(column, value)| (column, value.clone())))
            .build()?;
        Ok(format!("{} RETURNING *", sql))
    }

    pub async fn update(&self, table: &str, changes: &Row, conditions: Conditions) -> OrmResult<Vec<Row>> {
        let sql = self
            .query()
            .update()
            .table(table)
            .set_values(changes.iter().map(|(column, value)| (column, value.clone())))
            .where_conditions(conditions)
            .build()?;
        self.execute(&sql).await
    }

    pub async fn remove(&self, table: &str, conditions: Conditions) -> OrmResult<Vec<Row>> {
        let sql = self.query().remove().from(table).where_conditions(conditions).build()?;
        self.execute(&sql).await
    }

    /// Empty `table`
    pub async fn clear(&self, table: &str) -> OrmResult<Vec<Row>> {
        let sql = format!("TRUNCATE TABLE {}", self.query().escape_id(&[table]));
        self.execute(&sql).await
    }

    /// Run raw SQL, filling `??` identifier and `?` value placeholders from `args`
    pub async fn exec_query(&self, sql: &str, args: &[DatabaseValue]) -> OrmResult<Vec<Row>> {
        if args.is_empty() {
            return self.execute(sql).await;
        }
        let sql = self.query().escape(sql, args)?;
        self.execute(&sql).await
    }

    /// Load associated rows of every parent in `parent_keys` with one
    /// statement. Each row carries its parent's key as `$p`.
    pub async fn eager_query(
        &self,
        association: &EagerAssociation,
        only: &[&str],
        parent_keys: Vec<DatabaseValue>,
    ) -> OrmResult<Vec<Row>> {
        let sql = self.eager_query_sql(association, only, parent_keys)?;
        self.execute(&sql).await
    }

    pub fn eager_query_sql(
        &self,
        association: &EagerAssociation,
        only: &[&str],
        parent_keys: Vec<DatabaseValue>,
    ) -> OrmResult<String> {
        self.query()
            .select()
            .from(&association.model_table)
            .select(only.iter().copied())
            .join_last(
                &association.merge_table,
                association.merge_assoc_fields.clone(),
                association.model_keys.clone(),
            )?
            .select([association.parent_field.as_str()])
            .as_alias(PARENT_KEY_ALIAS)
            .where_table(
                &association.merge_table,
                Conditions::new().eq(association.parent_field.as_str(), DatabaseValue::Array(parent_keys)),
            )?
            .build()
    }
}

fn apply_joins<'a>(mut query: SelectQuery, joins: impl Iterator<Item = &'a JoinSpec>) -> OrmResult<SelectQuery> {
    for (index, join) in joins.enumerate() {
        let alias = join
            .to_alias
            .clone()
            .unwrap_or_else(|| format!("j{}", index + 1));

        query = query
            .from_join(&join.to_table, join.to_fields.clone(), &join.from_table, join.from_fields.clone())?
            .alias(&alias);

        if let Some(conditions) = &join.conditions {
            query = query.where_table(&alias, conditions.clone())?;
        }
    }
    Ok(query)
}

/// Main conditions: after a merge they go to the merge's table (after its own
/// filter), with joins they are qualified by the base table, otherwise bare
fn apply_filters(
    mut query: SelectQuery,
    table: &str,
    joined: bool,
    merge: Option<MergeSpec>,
    conditions: Conditions,
) -> OrmResult<SelectQuery> {
    match merge {
        Some(merge) => {
            if let Some((filter_table, filter)) = merge.filter.filter(|(_, filter)| !filter.is_empty()) {
                query = query.where_table(&filter_table, filter)?;
            }
            query.where_group(merge.table.as_deref(), conditions)
        }
        None if joined => query.where_table(table, conditions),
        None => Ok(query.where_conditions(conditions)),
    }
}

fn resolve_keys(returned: Option<&Row>, data: &Row, keys: &[Property]) -> Row {
    keys.iter()
        .map(|property| {
            let value = match returned {
                Some(row) => row.get(&property.maps_to).cloned(),
                None => data
                    .get(&property.name)
                    .or_else(|| data.get(&property.maps_to))
                    .cloned(),
            };
            (property.name.clone(), value.unwrap_or(DatabaseValue::Null))
        })
        .collect()
}
