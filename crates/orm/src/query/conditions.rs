//! Condition trees
//!
//! A [`Conditions`] value is one node of a where tree: a set of column
//! predicates (conjoined, equality unless a comparator is given) plus any
//! number of boolean combinators wrapping nested trees.

use crate::backends::DatabaseValue;
use crate::sql::comparators::Comparator;

/// Boolean combinator over nested condition trees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
    NotAnd,
    NotOr,
    /// Same as `NotAnd`
    Not,
}

impl BoolOp {
    /// Operator joining the nested groups
    pub fn keyword(&self) -> &'static str {
        match self {
            BoolOp::And | BoolOp::NotAnd | BoolOp::Not => "AND",
            BoolOp::Or | BoolOp::NotOr => "OR",
        }
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, BoolOp::NotAnd | BoolOp::NotOr | BoolOp::Not)
    }

    /// Parse a combinator key (`and`, `or`, `not_and`, `not_or`, `not`)
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "and" => Some(BoolOp::And),
            "or" => Some(BoolOp::Or),
            "not_and" => Some(BoolOp::NotAnd),
            "not_or" => Some(BoolOp::NotOr),
            "not" => Some(BoolOp::Not),
            _ => None,
        }
    }
}

/// Value side of a column predicate
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    /// Plain value: equality, `IS NULL` for null, membership for arrays
    Value(DatabaseValue),
    Comparator(Comparator),
}

impl From<DatabaseValue> for ConditionValue {
    fn from(value: DatabaseValue) -> Self {
        ConditionValue::Value(value)
    }
}

impl From<Comparator> for ConditionValue {
    fn from(comparator: Comparator) -> Self {
        ConditionValue::Comparator(comparator)
    }
}

/// A node of the condition tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    combinators: Vec<(BoolOp, Vec<Conditions>)>,
    columns: Vec<(String, ConditionValue)>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column predicate, replacing an earlier one for the same column
    pub fn set(mut self, column: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<ConditionValue>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(existing, _)| *existing == column) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((column, value)),
        }
    }

    /// `column = value`; arrays test membership, null tests `IS NULL`
    pub fn eq(self, column: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        self.set(column, ConditionValue::Value(value.into()))
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.set(column, ConditionValue::Value(DatabaseValue::Null))
    }

    pub fn cmp(self, column: impl Into<String>, comparator: Comparator) -> Self {
        self.set(column, ConditionValue::Comparator(comparator))
    }

    /// Wrap nested trees in a combinator
    pub fn combine(mut self, op: BoolOp, groups: Vec<Conditions>) -> Self {
        self.combinators.push((op, groups));
        self
    }

    pub fn and(self, groups: Vec<Conditions>) -> Self {
        self.combine(BoolOp::And, groups)
    }

    pub fn or(self, groups: Vec<Conditions>) -> Self {
        self.combine(BoolOp::Or, groups)
    }

    pub fn not_and(self, groups: Vec<Conditions>) -> Self {
        self.combine(BoolOp::NotAnd, groups)
    }

    pub fn not_or(self, groups: Vec<Conditions>) -> Self {
        self.combine(BoolOp::NotOr, groups)
    }

    pub fn not(self, groups: Vec<Conditions>) -> Self {
        self.combine(BoolOp::Not, groups)
    }

    pub fn get(&self, column: &str) -> Option<&ConditionValue> {
        self.columns
            .iter()
            .find(|(existing, _)| existing == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> &[(String, ConditionValue)] {
        &self.columns
    }

    pub fn combinators(&self) -> &[(BoolOp, Vec<Conditions>)] {
        &self.combinators
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.combinators.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Conditions
where
    K: Into<String>,
    V: Into<ConditionValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut conditions = Conditions::new();
        for (column, value) in iter {
            conditions.insert(column, value);
        }
        conditions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::comparators;

    #[test]
    fn test_columns_keep_insertion_order_and_replace() {
        let conditions = Conditions::new()
            .eq("age", 18)
            .eq("name", "Jane")
            .cmp("age", comparators::gte(21));

        assert_eq!(conditions.columns().len(), 2);
        assert_eq!(conditions.columns()[0].0, "age");
        assert_eq!(
            conditions.get("age"),
            Some(&ConditionValue::Comparator(comparators::gte(21)))
        );
    }

    #[test]
    fn test_combinator_keys() {
        assert_eq!(BoolOp::from_key("not"), Some(BoolOp::Not));
        assert_eq!(BoolOp::from_key("xor"), None);
        assert_eq!(BoolOp::Not.keyword(), "AND");
        assert_eq!(BoolOp::NotOr.keyword(), "OR");
        assert!(BoolOp::Not.is_negated());
        assert!(!BoolOp::Or.is_negated());
    }

    #[test]
    fn test_collect_from_pairs() {
        let conditions: Conditions = vec![
            ("id", ConditionValue::from(DatabaseValue::Int32(1))),
            ("deleted_at", DatabaseValue::Null.into()),
        ]
        .into_iter()
        .collect();

        assert!(!conditions.is_empty());
        assert!(Conditions::new().is_empty());
        assert_eq!(conditions.get("deleted_at"), Some(&ConditionValue::Value(DatabaseValue::Null)));
    }
}
