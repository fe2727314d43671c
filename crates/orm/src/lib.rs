//! # quarry-orm: SQL query builder and driver core
//!
//! Chainable select/insert/update/delete builders that compile to
//! PostgreSQL text, and a driver that executes that text over a pooled or
//! exclusive sqlx connection with per-property type coercion.
//!
//! ```no_run
//! use quarry_orm::{Conditions, Query, Timezone};
//!
//! let sql = Query::postgres(Timezone::Local)
//!     .select()
//!     .from("person")
//!     .where_conditions(Conditions::new().eq("age", 18))
//!     .build()?;
//! assert_eq!(sql, r#"SELECT * FROM "person" WHERE "age" = 18"#);
//! # Ok::<(), quarry_orm::OrmError>(())
//! ```

pub mod backends;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod query;
pub mod sql;

// Re-export core traits and types
pub use backends::{AdapterRegistry, DatabaseAdapter, DatabaseValue, Row, Transport};
pub use config::{ConnectionConfig, DriverOptions, Timezone};
pub use connection::PoolRegistry;
pub use driver::*;
pub use error::*;
pub use query::*;
pub use sql::comparators;
pub use sql::{Comparator, ComparatorOp, Dialect, PostgresDialect, RawSql};
