//! Error types for the sqlgrid connection pool.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that can occur during pool and connection operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("connection with ID {0} already exists")]
    DuplicateId(String),

    #[error("connection pool limit reached (max: {0})")]
    CapacityExceeded(usize),

    #[error("failed to parse DSN: {0}")]
    InvalidDsn(String),

    #[error("no driver registered for scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("failed to open database connection: {0}")]
    Open(String),

    #[error("failed to ping database: {0}")]
    Unreachable(String),

    #[error("connection with ID {0} not found")]
    NotFound(String),

    #[error("query execution failed: {0}")]
    Query(String),

    #[error("failed to get columns: {0}")]
    Columns(String),

    #[error("failed to scan row: {0}")]
    RowDecode(String),

    #[error("row iteration error: {0}")]
    RowIteration(String),

    #[error("statement execution failed: {0}")]
    Statement(String),

    #[error("failed to close connection: {0}")]
    Close(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection handle is closed")]
    Closed,
}
