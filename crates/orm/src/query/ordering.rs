//! Query Builder ORDER BY and GROUP BY operations

use super::builder::SelectQuery;
use super::types::*;
use crate::backends::DatabaseValue;
use crate::error::OrmResult;
use crate::sql::helpers::escape_query;

impl SelectQuery {
    /// Add ORDER BY clause; a leading `-` sorts descending
    pub fn order_by(self, column: &str) -> Self {
        match column.strip_prefix('-') {
            Some(column) => self.order(column, OrderDirection::Desc),
            None => self.order(column, OrderDirection::Asc),
        }
    }

    /// Add ORDER BY clause (descending)
    pub fn order_by_desc(self, column: &str) -> Self {
        self.order(column, OrderDirection::Desc)
    }

    pub fn order(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order.push(OrderItem::Column {
            table: None,
            column: column.to_string(),
            direction,
        });
        self
    }

    /// Order by a column of a specific table; the alias qualifies the column
    /// only when the query joins more than one table
    pub fn order_by_table(mut self, table: &str, column: &str, direction: OrderDirection) -> OrmResult<Self> {
        let alias = self.resolve_alias(table)?;
        self.order.push(OrderItem::Column {
            table: Some(alias),
            column: column.to_string(),
            direction,
        });
        Ok(self)
    }

    /// Raw ORDER BY fragment; `??` takes an identifier and `?` a value from `args`
    pub fn order_raw(mut self, sql: &str, args: &[DatabaseValue]) -> OrmResult<Self> {
        let fragment = escape_query(self.dialect.as_ref(), sql, args, &self.timezone)?;
        self.order.push(OrderItem::Raw(fragment));
        Ok(self)
    }

    /// Add GROUP BY columns; a leading `-` also orders by the column descending
    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Timezone;
    use crate::sql::dialect::PostgresDialect;

    fn query() -> SelectQuery {
        SelectQuery::new(Arc::new(PostgresDialect), Timezone::Local)
    }

    #[test]
    fn test_order_prefix() {
        let q = query().from("person").order_by("-age").order_by("name");
        assert_eq!(
            q.order,
            vec![
                OrderItem::Column {
                    table: None,
                    column: "age".into(),
                    direction: OrderDirection::Desc
                },
                OrderItem::Column {
                    table: None,
                    column: "name".into(),
                    direction: OrderDirection::Asc
                },
            ]
        );
    }

    #[test]
    fn test_order_raw_escapes_placeholders() {
        let q = query()
            .from("person")
            .order_raw("?? DESC, LENGTH(??) > ?", &["age".into(), "name".into(), 3.into()])
            .unwrap();
        assert_eq!(q.order, vec![OrderItem::Raw("\"age\" DESC, LENGTH(\"name\") > 3".into())]);
    }
}
