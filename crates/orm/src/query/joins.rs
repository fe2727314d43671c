//! Query Builder FROM and JOIN operations

use super::builder::SelectQuery;
use super::types::*;
use crate::error::OrmResult;

impl SelectQuery {
    /// Set the first table. Joined tables go through [`SelectQuery::from_join`]
    /// or [`SelectQuery::join_last`]; a bare `from` after the first table is
    /// reported as a query error by `build`.
    pub fn from(mut self, table: &str) -> Self {
        if !self.from.is_empty() {
            self.defer_error(format!("table '{}' joined without join columns", table));
            return self;
        }
        self.push_table(table, Vec::new());
        self
    }

    /// Join `table`, matching `from_keys` of the new table against `to_keys`
    /// of `to_table` (a table name or alias already in the query)
    pub fn from_join(
        mut self,
        table: &str,
        from_keys: impl Into<JoinKeys>,
        to_table: &str,
        to_keys: impl Into<JoinKeys>,
    ) -> OrmResult<Self> {
        if self.from.is_empty() {
            self.push_table(table, Vec::new());
            return Ok(self);
        }

        let target_alias = self.resolve_alias(to_table)?;
        let joins = join_predicates(from_keys.into(), target_alias, to_keys.into())?;
        self.push_table(table, joins);
        Ok(self)
    }

    /// Join `table` against the most recently added table
    pub fn join_last(
        mut self,
        table: &str,
        from_keys: impl Into<JoinKeys>,
        to_keys: impl Into<JoinKeys>,
    ) -> OrmResult<Self> {
        let target_alias = match self.from.last() {
            Some(last) => last.alias.clone(),
            None => {
                self.push_table(table, Vec::new());
                return Ok(self);
            }
        };

        let joins = join_predicates(from_keys.into(), target_alias, to_keys.into())?;
        self.push_table(table, joins);
        Ok(self)
    }

    /// Rename the alias of the most recently added table
    pub fn alias(mut self, alias: &str) -> Self {
        match self.from.last_mut() {
            Some(entry) => entry.alias = alias.to_string(),
            None => self.defer_error(format!("alias '{}' set before any table", alias)),
        }
        self
    }

    fn push_table(&mut self, table: &str, joins: Vec<JoinPredicate>) {
        let alias = format!("t{}", self.from.len() + 1);
        self.from.push(FromEntry {
            table: table.to_string(),
            alias,
            joins,
            select: Vec::new(),
        });
    }
}

fn join_predicates(from_keys: JoinKeys, target_alias: String, to_keys: JoinKeys) -> OrmResult<Vec<JoinPredicate>> {
    Ok(from_keys
        .pair(to_keys)?
        .into_iter()
        .map(|(from, to)| JoinPredicate {
            from,
            target_alias: target_alias.clone(),
            to,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Timezone;
    use crate::error::OrmError;
    use crate::sql::dialect::PostgresDialect;

    fn query() -> SelectQuery {
        SelectQuery::new(Arc::new(PostgresDialect), Timezone::Local)
    }

    #[test]
    fn test_aliases_follow_insertion_order() {
        let q = query()
            .from("person")
            .from_join("pet", "owner_id", "person", "id")
            .unwrap()
            .join_last("vet", "id", "vet_id")
            .unwrap();

        let aliases: Vec<_> = q.tables().iter().map(|t| t.alias.as_str()).collect();
        assert_eq!(aliases, ["t1", "t2", "t3"]);
        assert!(q.tables()[0].joins.is_empty());
        assert_eq!(q.tables()[2].joins[0].target_alias, "t2");
    }

    #[test]
    fn test_join_fails_fast() {
        let err = query()
            .from("person")
            .from_join("pet", ["a", "b"], "person", ["id"])
            .unwrap_err();
        assert!(matches!(err, OrmError::MalformedJoin(_)));

        let err = query().from("person").from_join("pet", "owner_id", "owner", "id").unwrap_err();
        assert!(matches!(err, OrmError::UnknownTableReference(_)));
    }

    #[test]
    fn test_bare_from_after_first_table_is_reported() {
        let mut q = query().from("person").from("pet");
        assert!(matches!(q.build(), Err(OrmError::Query(_))));
    }
}
