//! Query Builder Types - Core types and enums for query building

use std::fmt;

use crate::backends::DatabaseValue;
use crate::error::{OrmError, OrmResult};
use crate::query::conditions::Conditions;
use crate::sql::comparators::Comparator;

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    /// `"Z"` sorts descending, anything else ascending
    pub fn from_code(code: &str) -> Self {
        if code == "Z" {
            OrderDirection::Desc
        } else {
            OrderDirection::Asc
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// SQL functions usable in a select list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    Abs,
    Ceil,
    Floor,
    Round,
    Avg,
    Min,
    Max,
    Log,
    Log2,
    Log10,
    Exp,
    Power,
    Acos,
    Asin,
    Atan,
    Cos,
    Sin,
    Tan,
    Conv,
    Random,
    Rand,
    Radians,
    Degrees,
    Sum,
    Count,
    Distinct,
}

impl Aggregate {
    pub const ALL: [Aggregate; 26] = [
        Aggregate::Abs,
        Aggregate::Ceil,
        Aggregate::Floor,
        Aggregate::Round,
        Aggregate::Avg,
        Aggregate::Min,
        Aggregate::Max,
        Aggregate::Log,
        Aggregate::Log2,
        Aggregate::Log10,
        Aggregate::Exp,
        Aggregate::Power,
        Aggregate::Acos,
        Aggregate::Asin,
        Aggregate::Atan,
        Aggregate::Cos,
        Aggregate::Sin,
        Aggregate::Tan,
        Aggregate::Conv,
        Aggregate::Random,
        Aggregate::Rand,
        Aggregate::Radians,
        Aggregate::Degrees,
        Aggregate::Sum,
        Aggregate::Count,
        Aggregate::Distinct,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::Abs => "ABS",
            Aggregate::Ceil => "CEIL",
            Aggregate::Floor => "FLOOR",
            Aggregate::Round => "ROUND",
            Aggregate::Avg => "AVG",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
            Aggregate::Log => "LOG",
            Aggregate::Log2 => "LOG2",
            Aggregate::Log10 => "LOG10",
            Aggregate::Exp => "EXP",
            Aggregate::Power => "POWER",
            Aggregate::Acos => "ACOS",
            Aggregate::Asin => "ASIN",
            Aggregate::Atan => "ATAN",
            Aggregate::Cos => "COS",
            Aggregate::Sin => "SIN",
            Aggregate::Tan => "TAN",
            Aggregate::Conv => "CONV",
            Aggregate::Random => "RANDOM",
            Aggregate::Rand => "RAND",
            Aggregate::Radians => "RADIANS",
            Aggregate::Degrees => "DEGREES",
            Aggregate::Sum => "SUM",
            Aggregate::Count => "COUNT",
            Aggregate::Distinct => "DISTINCT",
        }
    }
}

impl std::str::FromStr for Aggregate {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Aggregate::ALL
            .iter()
            .find(|function| function.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| OrmError::Query(format!("Unknown SQL function '{}'", s)))
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Function argument
#[derive(Debug, Clone, PartialEq)]
pub enum FunArg {
    /// Column reference, qualified with the table alias when joining
    Column(String),
    /// Literal escaped through the dialect
    Value(DatabaseValue),
}

impl From<&str> for FunArg {
    fn from(column: &str) -> Self {
        FunArg::Column(column.to_string())
    }
}

impl From<String> for FunArg {
    fn from(column: String) -> Self {
        FunArg::Column(column)
    }
}

impl From<DatabaseValue> for FunArg {
    fn from(value: DatabaseValue) -> Self {
        FunArg::Value(value)
    }
}

/// One entry of a table's select list
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Column {
        name: String,
        alias: Option<String>,
    },
    /// Raw expression, rendered parenthesized
    Raw {
        sql: String,
        alias: Option<String>,
    },
    Function {
        function: Aggregate,
        args: Vec<FunArg>,
        alias: Option<String>,
        /// Outer functions queued before this call, outermost first
        wrappers: Vec<Aggregate>,
    },
    /// Column used as a HAVING predicate; not part of the select list
    Having(String),
}

impl SelectItem {
    pub(crate) fn set_alias(&mut self, new_alias: Option<String>) {
        match self {
            SelectItem::Column { alias, .. }
            | SelectItem::Raw { alias, .. }
            | SelectItem::Function { alias, .. } => *alias = new_alias,
            SelectItem::Having(_) => {}
        }
    }
}

/// One side of a join predicate
#[derive(Debug, Clone, PartialEq)]
pub enum JoinColumn {
    Column(String),
    /// Comparator whose operand names a column of the other table
    Comparator(Comparator),
}

impl JoinColumn {
    fn is_blank(&self) -> bool {
        matches!(self, JoinColumn::Column(c) if c.is_empty())
    }
}

impl From<&str> for JoinColumn {
    fn from(column: &str) -> Self {
        JoinColumn::Column(column.to_string())
    }
}

impl From<String> for JoinColumn {
    fn from(column: String) -> Self {
        JoinColumn::Column(column)
    }
}

impl From<Comparator> for JoinColumn {
    fn from(comparator: Comparator) -> Self {
        JoinColumn::Comparator(comparator)
    }
}

/// Join keys: one column, or parallel columns compared pairwise
#[derive(Debug, Clone, PartialEq)]
pub enum JoinKeys {
    Single(JoinColumn),
    Many(Vec<JoinColumn>),
}

impl JoinKeys {
    /// Pair up both sides, failing on empty keys or mismatched arity
    pub fn pair(self, other: JoinKeys) -> OrmResult<Vec<(JoinColumn, JoinColumn)>> {
        let pairs = match (self, other) {
            (JoinKeys::Single(from), JoinKeys::Single(to)) => vec![(from, to)],
            (JoinKeys::Many(from), JoinKeys::Many(to)) if from.len() == to.len() => {
                from.into_iter().zip(to).collect()
            }
            (JoinKeys::Many(from), JoinKeys::Many(to)) => {
                return Err(OrmError::MalformedJoin(format!(
                    "{} join columns cannot pair with {}",
                    from.len(),
                    to.len()
                )));
            }
            _ => {
                return Err(OrmError::MalformedJoin(
                    "cannot pair a single join column with a column list".to_string(),
                ));
            }
        };

        if pairs.is_empty() {
            return Err(OrmError::MalformedJoin("join needs at least one column pair".to_string()));
        }
        if pairs.iter().any(|(from, to)| from.is_blank() || to.is_blank()) {
            return Err(OrmError::MalformedJoin("join column names must not be empty".to_string()));
        }
        if pairs.iter().any(|(from, to)| {
            matches!(from, JoinColumn::Comparator(_)) && matches!(to, JoinColumn::Comparator(_))
        }) {
            return Err(OrmError::MalformedJoin(
                "only one side of a join pair may carry a comparator".to_string(),
            ));
        }

        Ok(pairs)
    }
}

impl From<&str> for JoinKeys {
    fn from(column: &str) -> Self {
        JoinKeys::Single(column.into())
    }
}

impl From<String> for JoinKeys {
    fn from(column: String) -> Self {
        JoinKeys::Single(column.into())
    }
}

impl From<Comparator> for JoinKeys {
    fn from(comparator: Comparator) -> Self {
        JoinKeys::Single(comparator.into())
    }
}

impl From<Vec<&str>> for JoinKeys {
    fn from(columns: Vec<&str>) -> Self {
        JoinKeys::Many(columns.into_iter().map(JoinColumn::from).collect())
    }
}

impl From<Vec<String>> for JoinKeys {
    fn from(columns: Vec<String>) -> Self {
        JoinKeys::Many(columns.into_iter().map(JoinColumn::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for JoinKeys {
    fn from(columns: [&str; N]) -> Self {
        JoinKeys::Many(columns.into_iter().map(JoinColumn::from).collect())
    }
}

/// Join predicate: `from` is a column of the joined table, `to` a column of
/// the table registered under `target_alias`
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPredicate {
    pub from: JoinColumn,
    pub target_alias: String,
    pub to: JoinColumn,
}

/// One table of the FROM clause
#[derive(Debug, Clone, PartialEq)]
pub struct FromEntry {
    pub table: String,
    pub alias: String,
    /// Empty for the first table, non-empty for every joined one
    pub joins: Vec<JoinPredicate>,
    pub select: Vec<SelectItem>,
}

/// Columns linking an EXISTS subquery to the outer table
#[derive(Debug, Clone, PartialEq)]
pub enum LinkColumns {
    Single(String, String),
    Parallel(Vec<String>, Vec<String>),
}

impl LinkColumns {
    pub fn single(inner: impl Into<String>, outer: impl Into<String>) -> Self {
        LinkColumns::Single(inner.into(), outer.into())
    }

    pub fn parallel<I, O, S, T>(inner: I, outer: O) -> OrmResult<Self>
    where
        I: IntoIterator<Item = S>,
        O: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let link = LinkColumns::Parallel(
            inner.into_iter().map(Into::into).collect(),
            outer.into_iter().map(Into::into).collect(),
        );
        link.validate()?;
        Ok(link)
    }

    pub fn validate(&self) -> OrmResult<()> {
        match self {
            LinkColumns::Single(inner, outer) if inner.is_empty() || outer.is_empty() => Err(
                OrmError::MalformedJoin("EXISTS link columns must not be empty".to_string()),
            ),
            LinkColumns::Parallel(inner, outer) if inner.len() != outer.len() => {
                Err(OrmError::MalformedJoin(format!(
                    "EXISTS link has {} inner columns but {} outer columns",
                    inner.len(),
                    outer.len()
                )))
            }
            LinkColumns::Parallel(inner, _) if inner.is_empty() => Err(OrmError::MalformedJoin(
                "EXISTS link needs at least one column pair".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// `(inner, outer)` column pairs
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        match self {
            LinkColumns::Single(inner, outer) => vec![(inner.as_str(), outer.as_str())],
            LinkColumns::Parallel(inner, outer) => inner
                .iter()
                .zip(outer)
                .map(|(i, o)| (i.as_str(), o.as_str()))
                .collect(),
        }
    }
}

/// Correlated EXISTS subquery description
#[derive(Debug, Clone, PartialEq)]
pub struct ExistsClause {
    pub table: String,
    /// Resolved alias of the outer table the link columns refer to
    pub outer_alias: String,
    pub link: LinkColumns,
}

/// One top-level where group
#[derive(Debug, Clone, PartialEq)]
pub struct WhereGroup {
    /// Alias qualifying the group's columns
    pub table: Option<String>,
    pub conditions: Conditions,
    pub exists: Option<ExistsClause>,
}

impl WhereGroup {
    pub fn new(table: Option<String>, conditions: Conditions) -> Self {
        Self {
            table,
            conditions,
            exists: None,
        }
    }
}

/// Order clause entry
#[derive(Debug, Clone, PartialEq)]
pub enum OrderItem {
    Column {
        table: Option<String>,
        column: String,
        direction: OrderDirection,
    },
    /// Pre-escaped SQL fragment
    Raw(String),
}

/// Output format of a select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Rows,
    /// Aggregate every row into one JSON array returned as text
    Json,
}

/// Function applied to the JSON aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub function: String,
    pub args: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::comparators;

    #[test]
    fn test_order_direction_codes() {
        assert_eq!(OrderDirection::from_code("Z"), OrderDirection::Desc);
        assert_eq!(OrderDirection::from_code("A"), OrderDirection::Asc);
        assert_eq!(OrderDirection::from_code(""), OrderDirection::Asc);
    }

    #[test]
    fn test_aggregate_names_parse_back() {
        for function in Aggregate::ALL {
            assert_eq!(function.name().parse::<Aggregate>().unwrap(), function);
        }
        assert_eq!("count".parse::<Aggregate>().unwrap(), Aggregate::Count);
        assert!("median".parse::<Aggregate>().is_err());
    }

    #[test]
    fn test_join_key_pairing() {
        let pairs = JoinKeys::from(["a", "b"]).pair(JoinKeys::from(["x", "y"])).unwrap();
        assert_eq!(pairs.len(), 2);

        let err = JoinKeys::from(["a", "b"]).pair(JoinKeys::from(["x"])).unwrap_err();
        assert!(matches!(err, OrmError::MalformedJoin(_)));

        let err = JoinKeys::from("a").pair(JoinKeys::from(["x"])).unwrap_err();
        assert!(matches!(err, OrmError::MalformedJoin(_)));

        let err = JoinKeys::Many(vec![]).pair(JoinKeys::Many(vec![])).unwrap_err();
        assert!(matches!(err, OrmError::MalformedJoin(_)));

        let err = JoinKeys::from("").pair(JoinKeys::from("id")).unwrap_err();
        assert!(matches!(err, OrmError::MalformedJoin(_)));

        let err = JoinKeys::from(comparators::eq("a"))
            .pair(JoinKeys::from(comparators::eq("b")))
            .unwrap_err();
        assert!(matches!(err, OrmError::MalformedJoin(_)));
    }

    #[test]
    fn test_link_columns_validate_arity() {
        assert!(LinkColumns::parallel(["a", "b"], ["x", "y"]).is_ok());
        assert!(matches!(
            LinkColumns::parallel(["a", "b"], ["x"]),
            Err(OrmError::MalformedJoin(_))
        ));
        assert!(LinkColumns::Parallel(vec![], vec![]).validate().is_err());
        assert_eq!(LinkColumns::single("a", "b").pairs(), vec![("a", "b")]);
    }
}
