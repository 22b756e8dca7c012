//! Error types for sqlweave

use std::time::Duration;
use thiserror::Error;

/// Result type alias for sqlweave operations
pub type SqlResult<T> = Result<T, SqlError>;

/// Error types for composing and executing statements
#[derive(Debug, Error)]
pub enum SqlError {
    /// The statement being built cannot produce valid SQL
    #[error("Malformed statement: {0}")]
    Malformed(String),

    /// The active dialect lacks a feature the statement needs
    #[error("{feature} is not supported by the {dialect} dialect")]
    Unsupported {
        feature: &'static str,
        dialect: &'static str,
    },

    /// Failure reported by the driver
    #[error("Driver error: {0}")]
    Driver(Box<dyn std::error::Error + Send + Sync>),

    /// Failure reported by tokio-postgres
    #[cfg(feature = "postgres")]
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// A single-row fetch matched no rows
    #[error("Not found: {0}")]
    NotFound(String),

    /// The transaction was already committed or rolled back
    #[error("Transaction already closed ({0})")]
    TransactionClosed(&'static str),

    /// Statement exceeded its deadline
    #[error("Query timeout after {0:?}")]
    Timeout(Duration),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },
}

impl SqlError {
    /// Create a malformed-statement error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Create an unsupported-feature error
    pub fn unsupported(feature: &'static str, dialect: &'static str) -> Self {
        Self::Unsupported { feature, dialect }
    }

    /// Wrap any driver-side error
    pub fn driver(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Driver(err.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error was raised while building the statement
    pub fn is_build_error(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::Unsupported { .. })
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a closed-transaction error
    pub fn is_transaction_closed(&self) -> bool {
        matches!(self, Self::TransactionClosed(_))
    }
}
