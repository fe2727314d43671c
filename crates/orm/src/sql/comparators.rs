//! Comparator registry
//!
//! Factories that turn a comparison intent into a [`Comparator`]: an operator
//! drawn from a fixed whitelist plus its operand. The renderer resolves a
//! comparator into SQL through the dialect; nothing else inspects it.

use std::fmt;
use std::str::FromStr;

use crate::backends::DatabaseValue;
use crate::error::{OrmError, OrmResult};

/// Whitelisted comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparatorOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    NotBetween,
    Like,
    NotLike,
    NotIn,
    Any,
    NotAny,
    Mod,
    /// ltree ancestor (`@>`)
    Lta,
    /// ltree descendant (`<@`)
    Ltd,
    /// ltree match (`~`)
    Ltm,
    /// Raw SQL template
    Sql,
}

const WHITELIST: &[(&str, ComparatorOp)] = &[
    ("eq", ComparatorOp::Eq),
    ("ne", ComparatorOp::Ne),
    ("gt", ComparatorOp::Gt),
    ("gte", ComparatorOp::Gte),
    ("lt", ComparatorOp::Lt),
    ("lte", ComparatorOp::Lte),
    ("between", ComparatorOp::Between),
    ("not_between", ComparatorOp::NotBetween),
    ("like", ComparatorOp::Like),
    ("not_like", ComparatorOp::NotLike),
    ("not_in", ComparatorOp::NotIn),
    ("any", ComparatorOp::Any),
    ("not_any", ComparatorOp::NotAny),
    ("mod", ComparatorOp::Mod),
    ("lta", ComparatorOp::Lta),
    ("ltd", ComparatorOp::Ltd),
    ("ltm", ComparatorOp::Ltm),
    ("sql", ComparatorOp::Sql),
];

impl ComparatorOp {
    /// Operator token as registered in the whitelist
    pub fn token(&self) -> &'static str {
        WHITELIST
            .iter()
            .find(|(_, op)| op == self)
            .map(|(token, _)| *token)
            .unwrap_or("eq")
    }

    /// Look up a token, failing for anything outside the whitelist
    pub fn from_token(token: &str) -> OrmResult<Self> {
        WHITELIST
            .iter()
            .find(|(candidate, _)| *candidate == token)
            .map(|(_, op)| *op)
            .ok_or_else(|| OrmError::UnsupportedOperator(token.to_string()))
    }

    /// Operators whose operand is a `from`/`to` pair
    pub fn is_range(&self) -> bool {
        matches!(self, ComparatorOp::Between | ComparatorOp::NotBetween)
    }

    /// Operators whose left side is the value and right side the column
    pub fn is_reversed(&self) -> bool {
        matches!(self, ComparatorOp::Any | ComparatorOp::NotAny)
    }
}

impl FromStr for ComparatorOp {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s)
    }
}

impl fmt::Display for ComparatorOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Raw SQL fragment with `?:column`, `?:id` and `?:value` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct RawSql {
    pub template: String,
    pub escapes: Vec<DatabaseValue>,
}

/// Comparator payload
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Val(DatabaseValue),
    Expr(DatabaseValue),
    Range { from: DatabaseValue, to: DatabaseValue },
    Sql(RawSql),
}

/// A tagged comparison intent. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparator {
    op: ComparatorOp,
    operand: Operand,
}

impl Comparator {
    /// Build a comparator from a token, validating it against the whitelist
    /// and the operand shape the operator expects.
    pub fn new(token: &str, operand: Operand) -> OrmResult<Self> {
        let op = ComparatorOp::from_token(token)?;

        let shape_ok = match (&operand, op) {
            (Operand::Range { .. }, op) => op.is_range(),
            (Operand::Sql(_), op) => op == ComparatorOp::Sql,
            (_, op) => !op.is_range() && op != ComparatorOp::Sql,
        };
        if !shape_ok {
            return Err(OrmError::Query(format!(
                "operand {:?} does not fit comparator '{}'",
                operand, op
            )));
        }

        Ok(Self { op, operand })
    }

    fn tagged(op: ComparatorOp, operand: Operand) -> Self {
        Self { op, operand }
    }

    /// The operator tag
    pub fn op(&self) -> ComparatorOp {
        self.op
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }
}

pub fn eq(value: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::Eq, Operand::Val(value.into()))
}

pub fn ne(value: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::Ne, Operand::Val(value.into()))
}

pub fn gt(value: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::Gt, Operand::Val(value.into()))
}

pub fn gte(value: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::Gte, Operand::Val(value.into()))
}

pub fn lt(value: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::Lt, Operand::Val(value.into()))
}

pub fn lte(value: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::Lte, Operand::Val(value.into()))
}

pub fn between(from: impl Into<DatabaseValue>, to: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(
        ComparatorOp::Between,
        Operand::Range {
            from: from.into(),
            to: to.into(),
        },
    )
}

pub fn not_between(from: impl Into<DatabaseValue>, to: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(
        ComparatorOp::NotBetween,
        Operand::Range {
            from: from.into(),
            to: to.into(),
        },
    )
}

pub fn like(pattern: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::Like, Operand::Expr(pattern.into()))
}

pub fn not_like(pattern: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::NotLike, Operand::Expr(pattern.into()))
}

pub fn not_in(values: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::NotIn, Operand::Val(values.into()))
}

/// Value is one of the elements of an array column
pub fn any(value: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::Any, Operand::Val(value.into()))
}

pub fn not_any(value: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::NotAny, Operand::Val(value.into()))
}

pub fn modulo(value: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::Mod, Operand::Val(value.into()))
}

pub fn lta(path: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::Lta, Operand::Val(path.into()))
}

pub fn ltd(path: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::Ltd, Operand::Val(path.into()))
}

pub fn ltm(query: impl Into<DatabaseValue>) -> Comparator {
    Comparator::tagged(ComparatorOp::Ltm, Operand::Val(query.into()))
}

/// Raw SQL escape hatch. `?:column` becomes the qualified column name,
/// `?:id` and `?:value` consume `escapes` in order.
pub fn sql(template: impl Into<String>, escapes: Vec<DatabaseValue>) -> Comparator {
    Comparator::tagged(
        ComparatorOp::Sql,
        Operand::Sql(RawSql {
            template: template.into(),
            escapes,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factories_carry_their_tag() {
        assert_eq!(eq(1).op(), ComparatorOp::Eq);
        assert_eq!(between(1, 5).op(), ComparatorOp::Between);
        assert_eq!(like("J%").op(), ComparatorOp::Like);
        assert_eq!(ltd("Top.Science").op(), ComparatorOp::Ltd);
        assert_eq!(
            between(1, 5).operand(),
            &Operand::Range {
                from: DatabaseValue::Int32(1),
                to: DatabaseValue::Int32(5)
            }
        );
    }

    #[test]
    fn test_unknown_tokens_are_rejected() {
        for token in ["", "EQ", "=", "; DROP TABLE users", "ilike", "between "] {
            let err = Comparator::new(token, Operand::Val(1.into())).unwrap_err();
            assert!(matches!(err, OrmError::UnsupportedOperator(t) if t == token));
        }
    }

    #[test]
    fn test_token_round_trip() {
        for (token, op) in WHITELIST {
            assert_eq!(op.token(), *token);
            assert_eq!(token.parse::<ComparatorOp>().unwrap(), *op);
        }
    }

    #[test]
    fn test_operand_shape_is_checked() {
        assert!(Comparator::new("between", Operand::Val(1.into())).is_err());
        assert!(Comparator::new(
            "eq",
            Operand::Range {
                from: 1.into(),
                to: 2.into()
            }
        )
        .is_err());
        assert!(Comparator::new("gte", Operand::Val(18.into())).is_ok());
    }
}
