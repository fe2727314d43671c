//! Query Builder WHERE clause operations and rendering

use super::builder::SelectQuery;
use super::conditions::{ConditionValue, Conditions};
use super::types::*;
use crate::backends::DatabaseValue;
use crate::config::Timezone;
use crate::error::OrmResult;
use crate::sql::comparators::{Comparator, Operand};
use crate::sql::dialect::{Dialect, RenderedOperand};
use crate::sql::helpers::fill_raw_sql;

impl SelectQuery {
    /// Add an unqualified where group
    pub fn where_conditions(mut self, conditions: Conditions) -> Self {
        self.where_groups.push(WhereGroup::new(None, conditions));
        self
    }

    /// Add a where group whose columns are qualified by `table`'s alias
    pub fn where_table(mut self, table: &str, conditions: Conditions) -> OrmResult<Self> {
        let alias = self.resolve_alias(table)?;
        self.where_groups.push(WhereGroup::new(Some(alias), conditions));
        Ok(self)
    }

    /// Table-qualified when `table` is given, unqualified otherwise
    pub fn where_group(self, table: Option<&str>, conditions: Conditions) -> OrmResult<Self> {
        match table {
            Some(table) => self.where_table(table, conditions),
            None => Ok(self.where_conditions(conditions)),
        }
    }

    /// Require a matching row in `table`, correlated to `table_link` through `link`
    pub fn where_exists(
        mut self,
        table: &str,
        table_link: &str,
        link: LinkColumns,
        conditions: Conditions,
    ) -> OrmResult<Self> {
        link.validate()?;
        let outer_alias = self.resolve_alias(table_link)?;

        self.where_groups.push(WhereGroup {
            table: self.from.last().map(|entry| entry.alias.clone()),
            conditions,
            exists: Some(ExistsClause {
                table: table.to_string(),
                outer_alias,
                link,
            }),
        });
        self.where_exists = true;
        Ok(self)
    }
}

/// Recursive renderer for where groups
#[derive(Debug, Clone, Copy)]
pub struct WhereRenderer<'a> {
    dialect: &'a dyn Dialect,
    timezone: &'a Timezone,
    qualify: bool,
}

impl<'a> WhereRenderer<'a> {
    pub fn new(dialect: &'a dyn Dialect, timezone: &'a Timezone) -> Self {
        Self {
            dialect,
            timezone,
            qualify: true,
        }
    }

    /// Drop table qualifiers from every group
    pub fn unqualified(mut self) -> Self {
        self.qualify = false;
        self
    }

    /// `WHERE ...` for the groups, or `None` when nothing renders
    pub fn render(&self, groups: &[WhereGroup]) -> Option<String> {
        let rendered: Vec<String> = groups.iter().filter_map(|group| self.render_group(group)).collect();

        match rendered.len() {
            0 => None,
            1 => Some(format!("WHERE {}", rendered[0])),
            _ => Some(format!("WHERE ({})", rendered.join(") AND ("))),
        }
    }

    fn render_group(&self, group: &WhereGroup) -> Option<String> {
        if let Some(exists) = &group.exists {
            return Some(self.render_exists(exists, &group.conditions));
        }

        let table = if self.qualify { group.table.as_deref() } else { None };
        self.render_conditions(table, &group.conditions)
    }

    /// Render one condition tree; `None` when it holds no predicate
    pub fn render_conditions(&self, table: Option<&str>, conditions: &Conditions) -> Option<String> {
        let mut parts = Vec::new();

        for (op, groups) in conditions.combinators() {
            let nested: Vec<String> = groups
                .iter()
                .filter_map(|group| self.render_conditions(table, group))
                .collect();
            if nested.is_empty() {
                continue;
            }

            let prefix = if op.is_negated() { "NOT " } else { "" };
            let separator = format!(") {} (", op.keyword());
            parts.push(format!("{}(({}))", prefix, nested.join(&separator)));
        }

        for (column, value) in conditions.columns() {
            let key = self.column_key(table, column);
            let predicate = match value {
                ConditionValue::Value(DatabaseValue::Null) => format!("{} IS NULL", key),
                ConditionValue::Value(DatabaseValue::Array(items)) if items.is_empty() => "FALSE".to_string(),
                ConditionValue::Value(array @ DatabaseValue::Array(_)) => {
                    format!("{} = ANY({})", key, self.escape(array))
                }
                ConditionValue::Value(value) => format!("{} = {}", key, self.escape(value)),
                ConditionValue::Comparator(comparator) => self.render_comparator(&key, comparator),
            };
            parts.push(predicate);
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        }
    }

    fn render_comparator(&self, key: &str, comparator: &Comparator) -> String {
        let op = comparator.op();

        match comparator.operand() {
            Operand::Sql(raw) => fill_raw_sql(self.dialect, raw, key, self.timezone),
            Operand::Range { from, to } => self.dialect.resolve_comparator(
                key,
                op,
                &RenderedOperand::Range {
                    from: self.escape(from),
                    to: self.escape(to),
                },
            ),
            Operand::Val(value) | Operand::Expr(value) if op.is_reversed() => self.dialect.resolve_comparator(
                &self.escape(value),
                op,
                &RenderedOperand::Single(key.to_string()),
            ),
            Operand::Val(value) | Operand::Expr(value) => {
                self.dialect
                    .resolve_comparator(key, op, &RenderedOperand::Single(self.escape(value)))
            }
        }
    }

    fn render_exists(&self, exists: &ExistsClause, conditions: &Conditions) -> String {
        let links = exists
            .link
            .pairs()
            .into_iter()
            .map(|(inner, outer)| {
                format!(
                    "{} = {}",
                    self.dialect.escape_id(&[inner]),
                    self.dialect.escape_id(&[&exists.outer_alias, outer])
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ");

        let table = self.dialect.escape_id(&[&exists.table]);
        match self.render_conditions(None, conditions) {
            Some(nested) => format!("EXISTS (SELECT * FROM {} WHERE {} AND {})", table, links, nested),
            None => format!("EXISTS (SELECT * FROM {} WHERE {})", table, links),
        }
    }

    fn column_key(&self, table: Option<&str>, column: &str) -> String {
        match table {
            Some(table) => self.dialect.escape_id(&[table, column]),
            None => self.dialect.escape_id(&[column]),
        }
    }

    fn escape(&self, value: &DatabaseValue) -> String {
        self.dialect.escape_val(value, self.timezone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::comparators;
    use crate::sql::dialect::PostgresDialect;

    fn render(groups: &[WhereGroup]) -> Option<String> {
        WhereRenderer::new(&PostgresDialect, &Timezone::Local).render(groups)
    }

    fn group(conditions: Conditions) -> WhereGroup {
        WhereGroup::new(None, conditions)
    }

    #[test]
    fn test_empty_groups_render_nothing() {
        assert_eq!(render(&[]), None);
        assert_eq!(render(&[group(Conditions::new())]), None);
    }

    #[test]
    fn test_plain_columns_are_conjoined() {
        let sql = render(&[group(Conditions::new().eq("age", 18).is_null("deleted_at"))]);
        assert_eq!(sql.unwrap(), "WHERE \"age\" = 18 AND \"deleted_at\" IS NULL");
    }

    #[test]
    fn test_array_membership() {
        let sql = render(&[group(Conditions::new().eq("name", vec!["Jane", "John"]))]);
        assert_eq!(sql.unwrap(), "WHERE \"name\" = ANY('{Jane,John}')");

        let sql = render(&[group(Conditions::new().eq("id", Vec::<i32>::new()))]);
        assert_eq!(sql.unwrap(), "WHERE FALSE");
    }

    #[test]
    fn test_multiple_groups_are_parenthesized() {
        let sql = render(&[
            group(Conditions::new().eq("a", 1)),
            WhereGroup::new(Some("t2".into()), Conditions::new().eq("b", 2)),
        ]);
        assert_eq!(sql.unwrap(), "WHERE (\"a\" = 1) AND (\"t2\".\"b\" = 2)");
    }

    #[test]
    fn test_combinators_render_before_columns() {
        let conditions = Conditions::new()
            .eq("active", true)
            .or(vec![Conditions::new().eq("a", 1), Conditions::new().eq("b", 2)])
            .not(vec![Conditions::new().eq("c", 3)]);

        let sql = render(&[group(conditions)]).unwrap();
        assert_eq!(
            sql,
            "WHERE ((\"a\" = 1) OR (\"b\" = 2)) AND NOT ((\"c\" = 3)) AND \"active\" = true"
        );
    }

    #[test]
    fn test_nested_combinators() {
        let conditions = Conditions::new().not_or(vec![
            Conditions::new().and(vec![Conditions::new().eq("x", 1), Conditions::new().eq("y", 2)]),
            Conditions::new().is_null("z"),
            Conditions::new(),
        ]);

        let sql = render(&[group(conditions)]).unwrap();
        assert_eq!(sql, "WHERE NOT ((((\"x\" = 1) AND (\"y\" = 2))) OR (\"z\" IS NULL))");
    }

    #[test]
    fn test_comparators() {
        let conditions = Conditions::new()
            .cmp("age", comparators::between(18, 65))
            .cmp("name", comparators::like("J%"))
            .cmp("tags", comparators::any("rust"))
            .cmp("score", comparators::ne(0));

        let sql = render(&[group(conditions)]).unwrap();
        assert_eq!(
            sql,
            "WHERE \"age\" BETWEEN 18 AND 65 AND \"name\" LIKE 'J%' AND 'rust' = ANY(\"tags\") AND \"score\" <> 0"
        );
    }

    #[test]
    fn test_raw_sql_comparator() {
        let conditions = Conditions::new().cmp(
            "name",
            comparators::sql("LOWER(?:column) = ?:value", vec!["jane".into()]),
        );
        let groups = [WhereGroup::new(Some("t1".into()), conditions)];

        let sql = render(&groups).unwrap();
        assert_eq!(sql, "WHERE LOWER(\"t1\".\"name\") = 'jane'");

        let sql = WhereRenderer::new(&PostgresDialect, &Timezone::Local)
            .unqualified()
            .render(&groups)
            .unwrap();
        assert_eq!(sql, "WHERE LOWER(\"name\") = 'jane'");
    }

    #[test]
    fn test_exists_subquery() {
        let exists = WhereGroup {
            table: Some("t1".into()),
            conditions: Conditions::new().eq("pet_name", "Rex"),
            exists: Some(ExistsClause {
                table: "person_pets".into(),
                outer_alias: "t1".into(),
                link: LinkColumns::parallel(["owner_id", "owner_org"], ["id", "org"]).unwrap(),
            }),
        };

        assert_eq!(
            render(&[exists.clone()]).unwrap(),
            "WHERE EXISTS (SELECT * FROM \"person_pets\" WHERE \"owner_id\" = \"t1\".\"id\" AND \"owner_org\" = \"t1\".\"org\" AND \"pet_name\" = 'Rex')"
        );

        let bare = WhereGroup {
            conditions: Conditions::new(),
            ..exists
        };
        assert_eq!(
            render(&[bare]).unwrap(),
            "WHERE EXISTS (SELECT * FROM \"person_pets\" WHERE \"owner_id\" = \"t1\".\"id\" AND \"owner_org\" = \"t1\".\"org\")"
        );
    }
}
