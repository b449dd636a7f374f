//! Error types for app-details-core
//!
//! This module provides the error handling for the library:
//! - A top-level [`Error`] with `From` conversions for the crates the library sits on
//! - Domain-specific error types for the export job, metadata lookup and database
//! - Context information (destination path, package name, job state)

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for app-details-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for app-details-core
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "export_dir_name")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Export job error
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// Metadata lookup error
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// The handoff service could not resolve or share a file
    #[error("handoff error: {0}")]
    Handoff(String),

    /// An observer callback reported a failure
    #[error("observer error: {0}")]
    Observer(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A background task did not finish within the allowed time
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A background task ended without delivering its result
    #[error("background task aborted before completing")]
    TaskAborted,

    /// The controlling context has shut down and no longer accepts messages
    #[error("screen has been torn down")]
    ScreenClosed,
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Export job errors
///
/// Reasons are kept as strings so the error can be cloned onto broadcast events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    /// The destination directory is missing and could not be created
    #[error("cannot prepare destination {path}: {reason}")]
    PreparationFailed {
        /// The directory that could not be created
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// Creating, writing or closing the export file failed
    #[error("failed to write {path}: {reason}")]
    WriteFailed {
        /// The export file being written
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// The record store returned no queryable result for the package
    #[error("record store returned no result for {package}")]
    StoreUnavailable {
        /// The package whose records were requested
        package: String,
    },

    /// The run was cancelled before it finished
    #[error("export cancelled")]
    Cancelled,

    /// Another export is already in progress
    #[error("an export is already {state}")]
    Busy {
        /// The state the job was in when the trigger arrived
        state: String,
    },
}

/// Metadata lookup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// The provider did not answer within the configured timeout
    #[error("metadata lookup timed out after {0:?}")]
    Timeout(Duration),

    /// The provider has no listing for the package
    #[error("no listing found for {package}")]
    NotFound {
        /// The package that was looked up
        package: String,
    },

    /// The provider could not be reached or answered with an error status
    #[error("transport failure: {0}")]
    Transport(String),

    /// The provider answered but the response could not be understood
    #[error("unparseable listing: {0}")]
    Parse(String),

    /// The lookup was cancelled before it finished
    #[error("metadata lookup cancelled")]
    Cancelled,
}

impl Error {
    /// Short machine-readable code for the error, suitable for logs and event payloads
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Export(ExportError::PreparationFailed { .. }) => "preparation_failed",
            Error::Export(ExportError::WriteFailed { .. }) => "write_failed",
            Error::Export(ExportError::StoreUnavailable { .. }) => "store_unavailable",
            Error::Export(ExportError::Cancelled) => "export_cancelled",
            Error::Export(ExportError::Busy { .. }) => "export_busy",
            Error::Metadata(_) => "metadata_unavailable",
            Error::Handoff(_) => "handoff_failed",
            Error::Observer(_) => "observer_failed",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Timeout(_) => "timeout",
            Error::TaskAborted => "task_aborted",
            Error::ScreenClosed => "screen_closed",
        }
    }
}
