//! Database layer for app-details-core
//!
//! SQLite persistence for the records the export reads and for user preferences.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`records`] - Per-app tracker records and the [`RecordStore`](crate::export::RecordStore) implementation
//! - [`preferences`] - Persisted settings such as the metadata consent flag

use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod preferences;
mod records;

/// Tracker contact to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewTrackerHit {
    /// Package of the app that contacted the tracker
    pub package_name: String,
    /// Contacted tracker domain
    pub domain: String,
    /// Number of requests observed
    pub requests: i64,
    /// When the contact was observed (ISO-8601 date or timestamp)
    pub timestamp: String,
}

/// App record from database
#[derive(Debug, Clone, FromRow)]
pub struct AppRow {
    /// Package name (primary key)
    pub package: String,
    /// Linux user id of the app
    pub uid: i64,
    /// Human readable name
    pub name: String,
}

/// Database handle for app-details-core
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
