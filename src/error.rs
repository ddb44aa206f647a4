//! Error types for the pipeline

use std::time::Duration;
use thiserror::Error;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Session could not be obtained from the store
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A chunk of statements failed to execute
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Configuration error (missing or unreadable deployment config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Date range is inverted
    #[error("Invalid date range: from {from} is after to {to}")]
    InvalidRange {
        /// Inclusive start day
        from: chrono::NaiveDate,
        /// Exclusive end day
        to: chrono::NaiveDate,
    },

    /// Statement does not match its template
    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error came from the store rather than from the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Execution(_))
    }
}

/// Session acquisition errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Provider has not been initialized yet
    #[error("Store not initialized")]
    NotInitialized,

    /// Store is unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Pool has been shut down
    #[error("Session pool closed")]
    PoolClosed,

    /// No session became free in time
    #[error("Timed out after {0:?} waiting for a session")]
    Timeout(Duration),
}

/// Chunk execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Store rejected or failed the request
    #[error("Chunk {chunk} failed: {message}")]
    Store {
        /// Zero-based chunk index within the executor
        chunk: usize,
        /// Store-side message
        message: String,
    },

    /// Chunk did not finish within the configured timeout
    #[error("Chunk {chunk} timed out after {after:?}")]
    Timeout {
        /// Zero-based chunk index within the executor
        chunk: usize,
        /// Configured timeout
        after: Duration,
    },

    /// Expected column absent from a result row
    #[error("Missing column: {column}")]
    MissingColumn {
        /// Column name
        column: String,
    },

    /// Column present with an unexpected type
    #[error("Column {column} is not {expected}")]
    TypeMismatch {
        /// Column name
        column: String,
        /// Expected type name
        expected: &'static str,
    },
}

/// Failure reported by a store session while running a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    /// Create a store error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
