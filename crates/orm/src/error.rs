//! Error types for the ORM core
//!
//! Construction-time errors (bad comparator token, malformed join, unknown
//! table reference) are raised synchronously by the builders. Transport
//! errors are carried unchanged from the wire layer.

use thiserror::Error;

/// Result type alias for ORM operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for query construction and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// Comparator token outside the whitelisted operator set
    #[error("Unsupported comparator operator: {0}")]
    UnsupportedOperator(String),

    /// Join or EXISTS link columns with empty or mismatched arity
    #[error("Malformed join: {0}")]
    MalformedJoin(String),

    /// Table or alias that was never registered with `from`
    #[error("Unknown table reference '{0}'")]
    UnknownTableReference(String),

    /// Any other builder misuse
    #[error("Query error: {0}")]
    Query(String),

    /// Network, protocol or backend failure, never retried
    #[error("Transport error: {0}")]
    Transport(#[from] sqlx::Error),

    /// Driver lifecycle misuse
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No adapter registered under this name
    #[error("Unknown adapter '{0}'")]
    UnknownAdapter(String),

    /// Adapter aliases that resolve back onto themselves
    #[error("Adapter alias cycle while resolving '{0}'")]
    AdapterAliasCycle(String),

    /// JSON encoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrmError {
    /// Whether this error came from the transport
    pub fn is_transport(&self) -> bool {
        matches!(self, OrmError::Transport(_))
    }

    /// Whether this error was raised while building a statement
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            OrmError::UnsupportedOperator(_)
                | OrmError::MalformedJoin(_)
                | OrmError::UnknownTableReference(_)
                | OrmError::Query(_)
        )
    }
}

impl From<url::ParseError> for OrmError {
    fn from(err: url::ParseError) -> Self {
        OrmError::Configuration(format!("Invalid database URL: {}", err))
    }
}
