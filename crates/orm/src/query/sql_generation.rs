//! Query Builder SQL generation

use super::builder::SelectQuery;
use super::types::*;
use super::where_clause::WhereRenderer;
use crate::backends::DatabaseValue;
use crate::error::{OrmError, OrmResult};
use crate::sql::comparators::{Comparator, Operand};
use crate::sql::dialect::RenderedOperand;
use crate::sql::helpers::{fill_raw_sql, identifier_text};

impl SelectQuery {
    /// Compile the accumulated state into one SELECT statement.
    ///
    /// Clause order: `SELECT [DISTINCT ON (...)] list FROM ... [WHERE ...]
    /// [GROUP BY ...] [HAVING ...] [ORDER BY ...] [LIMIT n] [OFFSET m]`.
    pub fn build(&mut self) -> OrmResult<String> {
        self.check_deferred()?;
        if self.from.is_empty() {
            return Err(OrmError::Query("select query has no table".to_string()));
        }

        if let Some(function) = self.fun_stack.pop() {
            self.push_function(function, Vec::new(), None);
        }

        let mut query = vec![format!("SELECT{} {}", self.render_distinct_on(), self.render_select_list())];
        query.push(self.render_from());

        if let Some(where_clause) = self.render_where() {
            query.push(where_clause);
        }

        let mut order = Vec::new();
        if let Some(group_by) = &self.group_by {
            let columns: Vec<String> = group_by
                .iter()
                .map(|column| match column.strip_prefix('-') {
                    Some(column) => {
                        // Each descending group column goes to the front of the order list
                        order.insert(0, format!("{} DESC", self.dialect.escape_id(&[column])));
                        self.dialect.escape_id(&[column])
                    }
                    None => self.dialect.escape_id(&[column]),
                })
                .collect();
            query.push(format!("GROUP BY {}", columns.join(", ")));
        }

        let having = self.render_having();
        if !having.is_empty() {
            query.push(format!("HAVING {}", having.join(" AND ")));
        }

        order.extend(self.render_order());
        if !order.is_empty() {
            query.push(format!("ORDER BY {}", order.join(", ")));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => query.push(format!("LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => query.push(format!("LIMIT {}", limit)),
            (None, Some(offset)) => query.push(format!("OFFSET {}", offset)),
            (None, None) => {}
        }

        let sql = query.join(" ");
        match self.format {
            Format::Rows => Ok(sql),
            Format::Json => Ok(format!("SELECT {}::text AS json FROM ({}) t", self.render_json_aggregate()?, sql)),
        }
    }

    /// Count rows matching the tables, joins and where groups. Select list,
    /// ordering and paging are ignored.
    pub fn build_count(&self) -> OrmResult<String> {
        self.check_deferred()?;
        if self.from.is_empty() {
            return Err(OrmError::Query("count query has no table".to_string()));
        }

        let mut query = vec![
            format!("SELECT COUNT(*) AS {}", self.dialect.escape_id(&["c"])),
            self.render_from(),
        ];
        if let Some(where_clause) = self.render_where() {
            query.push(where_clause);
        }
        Ok(query.join(" "))
    }

    fn render_distinct_on(&self) -> String {
        let Some(columns) = &self.distinct_on else {
            return String::new();
        };

        let prefix = self.from.first().filter(|_| self.from.len() > 1).map(|first| first.alias.as_str());
        let columns: Vec<String> = columns
            .iter()
            .map(|column| match prefix {
                Some(alias) => self.dialect.escape_id(&[alias, column]),
                None => self.dialect.escape_id(&[column]),
            })
            .collect();
        format!(" DISTINCT ON ({})", columns.join(", "))
    }

    fn render_select_list(&self) -> String {
        let mut rendered: Vec<String> = Vec::new();

        for entry in &self.from {
            for item in &entry.select {
                let Some(expression) = self.render_select_item(entry, item) else {
                    continue;
                };
                if !rendered.contains(&expression) {
                    rendered.push(expression);
                }
            }
        }

        if rendered.is_empty() {
            "*".to_string()
        } else {
            rendered.join(", ")
        }
    }

    fn render_select_item(&self, entry: &FromEntry, item: &SelectItem) -> Option<String> {
        let with_alias = |expression: String, alias: &Option<String>| match alias {
            Some(alias) => format!("{} AS {}", expression, self.dialect.escape_id(&[alias])),
            None => expression,
        };

        match item {
            SelectItem::Column { name, alias } => Some(with_alias(self.column_ref(entry, name), alias)),
            SelectItem::Raw { sql, alias } => Some(with_alias(format!("({})", sql), alias)),
            SelectItem::Function {
                function,
                args,
                alias,
                wrappers,
            } => {
                let args = if args.is_empty() {
                    "*".to_string()
                } else {
                    args.iter()
                        .map(|arg| match arg {
                            FunArg::Column(column) => self.column_ref(entry, column),
                            FunArg::Value(value) => self.dialect.escape_val(value, &self.timezone),
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                };

                let mut expression = format!("{}({})", function.name(), args);
                for wrapper in wrappers.iter().rev() {
                    expression = format!("{}({})", wrapper.name(), expression);
                }
                Some(with_alias(expression, alias))
            }
            SelectItem::Having(_) => None,
        }
    }

    fn render_having(&self) -> Vec<String> {
        self.from
            .iter()
            .flat_map(|entry| entry.select.iter())
            .filter_map(|item| match item {
                SelectItem::Having(column) => Some(self.dialect.escape_id(&[column])),
                _ => None,
            })
            .collect()
    }

    fn render_from(&self) -> String {
        let aliased = self.is_aliased();
        let mut sql = String::from("FROM ");

        if self.from.len() > 2 {
            sql.push_str(&"(".repeat(self.from.len() - 2));
        }

        for (index, entry) in self.from.iter().enumerate() {
            if index > 0 {
                sql.push_str(" JOIN ");
            }

            sql.push_str(&self.dialect.escape_id(&[&entry.table]));
            if aliased {
                sql.push(' ');
                sql.push_str(&self.dialect.escape_id(&[&entry.alias]));
            }

            if index > 0 {
                let predicates: Vec<String> = entry
                    .joins
                    .iter()
                    .map(|join| self.render_join_predicate(entry, join))
                    .collect();
                sql.push_str(" ON ");
                sql.push_str(&predicates.join(" AND "));

                if index < self.from.len() - 1 {
                    sql.push(')');
                }
            }
        }

        sql
    }

    fn render_join_predicate(&self, entry: &FromEntry, join: &JoinPredicate) -> String {
        let id = |alias: &str, column: &str| self.dialect.escape_id(&[alias, column]);

        match (&join.from, &join.to) {
            (JoinColumn::Comparator(comparator), to) => {
                let left = id(join.target_alias.as_str(), join_column_name(to).as_str());
                self.resolve_join_comparator(&left, comparator, &entry.alias)
            }
            (from, JoinColumn::Comparator(comparator)) => {
                let left = id(entry.alias.as_str(), join_column_name(from).as_str());
                self.resolve_join_comparator(&left, comparator, &join.target_alias)
            }
            (JoinColumn::Column(from), JoinColumn::Column(to)) => {
                format!("{} = {}", id(entry.alias.as_str(), from), id(join.target_alias.as_str(), to))
            }
        }
    }

    /// Comparator operands in a join name columns of `alias`
    fn resolve_join_comparator(&self, left: &str, comparator: &Comparator, alias: &str) -> String {
        let id = |value: &DatabaseValue| self.dialect.escape_id(&[alias, identifier_text(value).as_str()]);

        let right = match comparator.operand() {
            Operand::Val(value) | Operand::Expr(value) => RenderedOperand::Single(id(value)),
            Operand::Range { from, to } => RenderedOperand::Range {
                from: id(from),
                to: id(to),
            },
            Operand::Sql(raw) => return fill_raw_sql(self.dialect.as_ref(), raw, left, &self.timezone),
        };
        self.dialect.resolve_comparator(left, comparator.op(), &right)
    }

    fn render_where(&self) -> Option<String> {
        let renderer = WhereRenderer::new(self.dialect.as_ref(), &self.timezone);
        if self.is_aliased() {
            renderer.render(&self.where_groups)
        } else {
            renderer.unqualified().render(&self.where_groups)
        }
    }

    fn render_order(&self) -> Vec<String> {
        let multiple_tables = self.from.len() > 1;

        self.order
            .iter()
            .map(|item| match item {
                OrderItem::Column {
                    table: Some(alias),
                    column,
                    direction,
                } if multiple_tables => format!("{} {}", self.dialect.escape_id(&[alias, column]), direction),
                OrderItem::Column { column, direction, .. } => {
                    format!("{} {}", self.dialect.escape_id(&[column]), direction)
                }
                OrderItem::Raw(sql) => sql.clone(),
            })
            .collect()
    }

    fn render_json_aggregate(&self) -> OrmResult<String> {
        let aggregate = "array_to_json(array_agg(t))";

        let Some(transform) = &self.transform else {
            return Ok(aggregate.to_string());
        };

        let function = self.dialect.escape_id(&[&transform.function]);
        match &transform.args {
            Some(args) => {
                let encoded = serde_json::to_string(args)?;
                let literal = self.dialect.escape_val(&encoded.into(), &self.timezone);
                Ok(format!("{}({}, {})", function, aggregate, literal))
            }
            None => Ok(format!("{}({})", function, aggregate)),
        }
    }

    /// Column reference, alias-qualified when the query is aliased
    fn column_ref(&self, entry: &FromEntry, column: &str) -> String {
        if self.from.len() > 1 {
            self.dialect.escape_id(&[&entry.alias, column])
        } else {
            self.dialect.escape_id(&[column])
        }
    }
}

fn join_column_name(column: &JoinColumn) -> String {
    match column {
        JoinColumn::Column(name) => name.clone(),
        JoinColumn::Comparator(comparator) => match comparator.operand() {
            Operand::Val(value) | Operand::Expr(value) => identifier_text(value),
            _ => String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Timezone;
    use crate::query::conditions::Conditions;
    use crate::sql::comparators;
    use crate::sql::dialect::PostgresDialect;

    fn query() -> SelectQuery {
        SelectQuery::new(Arc::new(PostgresDialect), Timezone::Local)
    }

    #[test]
    fn test_single_table_is_unaliased() {
        let sql = query()
            .from("person")
            .select(["name", "age"])
            .where_conditions(Conditions::new().eq("age", 18))
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT \"name\", \"age\" FROM \"person\" WHERE \"age\" = 18");
    }

    #[test]
    fn test_join_aliases_and_qualification() {
        let sql = query()
            .from("person")
            .select(["name"])
            .from_join("pet", "owner_id", "person", "id")
            .unwrap()
            .select(["name"])
            .where_table("pet", Conditions::new().eq("species", "dog"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            sql,
            "SELECT \"t1\".\"name\", \"t2\".\"name\" FROM \"person\" \"t1\" JOIN \"pet\" \"t2\" ON \"t2\".\"owner_id\" = \"t1\".\"id\" WHERE \"t2\".\"species\" = 'dog'"
        );
    }

    #[test]
    fn test_three_tables_nest_parentheses() {
        let sql = query()
            .from("a")
            .from_join("b", "a_id", "a", "id")
            .unwrap()
            .join_last("c", "b_id", "id")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            sql,
            "SELECT * FROM (\"a\" \"t1\" JOIN \"b\" \"t2\" ON \"t2\".\"a_id\" = \"t1\".\"id\") JOIN \"c\" \"t3\" ON \"t3\".\"b_id\" = \"t2\".\"id\""
        );
    }

    #[test]
    fn test_join_comparators() {
        let sql = query()
            .from("event")
            .from_join("slot", comparators::gte("starts_at"), "event", "starts_at")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"event\" \"t1\" JOIN \"slot\" \"t2\" ON \"t1\".\"starts_at\" >= \"t2\".\"starts_at\""
        );

        let sql = query()
            .from("event")
            .from_join("slot", "at", "event", comparators::between("starts_at", "ends_at"))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"event\" \"t1\" JOIN \"slot\" \"t2\" ON \"t2\".\"at\" BETWEEN \"t1\".\"starts_at\" AND \"t1\".\"ends_at\""
        );
    }

    #[test]
    fn test_functions_and_wrappers() {
        let sql = query()
            .from("person")
            .distinct()
            .count_of(["id"], Some("total"))
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT DISTINCT(COUNT(\"id\")) AS \"total\" FROM \"person\"");

        let sql = query().from("person").count().build().unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM \"person\"");

        let sql = query()
            .from("person")
            .fun(
                Aggregate::Round,
                vec![FunArg::from("score"), FunArg::from(crate::backends::DatabaseValue::Int32(2))],
                None,
            )
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT ROUND(\"score\", 2) FROM \"person\"");
    }

    #[test]
    fn test_duplicate_select_expressions_collapse() {
        let sql = query().from("person").select(["id", "name", "id"]).build().unwrap();
        assert_eq!(sql, "SELECT \"id\", \"name\" FROM \"person\"");
    }

    #[test]
    fn test_raw_select_and_alias() {
        let sql = query()
            .from("person")
            .select_raw("age * 2")
            .as_alias("double_age")
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT (age * 2) AS \"double_age\" FROM \"person\"");
    }

    #[test]
    fn test_group_by_negative_column_orders_first() {
        let sql = query()
            .from("person")
            .select(["age"])
            .count_of(["id"], Some("c"))
            .group_by(["-age"])
            .order_by("name")
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT \"age\", COUNT(\"id\") AS \"c\" FROM \"person\" GROUP BY \"age\" ORDER BY \"age\" DESC, \"name\" ASC"
        );
    }

    #[test]
    fn test_group_by_negative_columns_order_last_listed_first() {
        let sql = query()
            .from("person")
            .select(["age", "city"])
            .group_by(["-age", "name", "-city"])
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT \"age\", \"city\" FROM \"person\" GROUP BY \"age\", \"name\", \"city\" ORDER BY \"city\" DESC, \"age\" DESC"
        );
    }

    #[test]
    fn test_having_follows_group_by() {
        let sql = query()
            .from("person")
            .select(["age"])
            .having("is_adult")
            .group_by(["age"])
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT \"age\" FROM \"person\" GROUP BY \"age\" HAVING \"is_adult\"");
    }

    #[test]
    fn test_limit_offset_combinations() {
        assert_eq!(query().from("p").limit(5).build().unwrap(), "SELECT * FROM \"p\" LIMIT 5");
        assert_eq!(query().from("p").offset(10).build().unwrap(), "SELECT * FROM \"p\" OFFSET 10");
        assert_eq!(
            query().from("p").paginate(20, 3).build().unwrap(),
            "SELECT * FROM \"p\" LIMIT 20 OFFSET 40"
        );
    }

    #[test]
    fn test_distinct_on() {
        let sql = query().from("p").distinct_on(["name"]).build().unwrap();
        assert_eq!(sql, "SELECT DISTINCT ON (\"name\") * FROM \"p\"");

        let sql = query()
            .from("p")
            .from_join("q", "p_id", "p", "id")
            .unwrap()
            .distinct_on(["name"])
            .build()
            .unwrap();
        assert!(sql.starts_with("SELECT DISTINCT ON (\"t1\".\"name\") * FROM"));
    }

    #[test]
    fn test_json_format_and_transform() {
        let sql = query().from("p").format(Format::Json).build().unwrap();
        assert_eq!(
            sql,
            "SELECT array_to_json(array_agg(t))::text AS json FROM (SELECT * FROM \"p\") t"
        );

        let sql = query()
            .from("p")
            .format(Format::Json)
            .transform("reshape", Some(serde_json::json!("x")))
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT \"reshape\"(array_to_json(array_agg(t)), '[\"x\"]')::text AS json FROM (SELECT * FROM \"p\") t"
        );
    }

    #[test]
    fn test_exists_forces_aliases() {
        let sql = query()
            .from("person")
            .where_exists(
                "person_pets",
                "person",
                LinkColumns::single("person_id", "id"),
                Conditions::new().eq("pet_id", 3),
            )
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"person\" \"t1\" WHERE EXISTS (SELECT * FROM \"person_pets\" WHERE \"person_id\" = \"t1\".\"id\" AND \"pet_id\" = 3)"
        );
    }

    #[test]
    fn test_count_ignores_select_and_paging() {
        let sql = query()
            .from("person")
            .select(["name"])
            .where_conditions(Conditions::new().eq("age", 18))
            .order_by("name")
            .limit(3)
            .build_count()
            .unwrap();
        assert_eq!(sql, "SELECT COUNT(*) AS \"c\" FROM \"person\" WHERE \"age\" = 18");
    }

    #[test]
    fn test_build_without_table_fails() {
        assert!(matches!(query().build(), Err(OrmError::Query(_))));
        assert!(matches!(query().select(["a"]).from("p").build(), Err(OrmError::Query(_))));
    }
}
