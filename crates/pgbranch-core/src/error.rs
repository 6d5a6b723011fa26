//! Error types for pgbranch.

use thiserror::Error;

/// Result type alias using pgbranch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pgbranch operations.
///
/// Only orchestrator-fatal failures and validation failures are represented
/// here. Statement-level failures inside the best-effort phases never become
/// an `Error`; they are recorded as skipped statements in the clone report.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The empty target database could not be created
    #[error("Failed to create database '{database}': {message}")]
    CreateDatabase { database: String, message: String },

    /// Reading the source catalog failed
    #[error("Introspection of '{database}' failed: {message}")]
    Introspection { database: String, message: String },

    /// Dropping a half-built target after a fatal failure did not succeed
    #[error("Cleanup of '{database}' failed: {message}")]
    Cleanup { database: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error aborts a clone after work has started.
    ///
    /// Validation and configuration errors are raised before any connection
    /// is opened, so they never require cleanup of a target database.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::InvalidInput(_) | Error::Config(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("serialization: {}", e))
    }
}
