//! SQL Rendering Primitives
//!
//! Comparators describe a comparison intent, dialects turn identifiers,
//! literals and comparators into SQL text, and the helpers fill placeholder
//! templates through a dialect.

pub mod comparators;
pub mod dialect;
pub mod helpers;

pub use comparators::{Comparator, ComparatorOp, Operand, RawSql};
pub use dialect::{Dialect, PostgresDialect, RenderedOperand};
pub use helpers::{escape_query, fill_raw_sql};
