//! App and tracker record operations.

use crate::error::DatabaseError;
use crate::export::{RecordCursor, RecordStore};
use crate::types::{AppIdentity, ExportRow};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::{Column, Executor, Row, Statement};

use super::{AppRow, Database, NewTrackerHit};

/// Columns exported for one app, in file order
const EXPORT_QUERY: &str = r#"
    SELECT domain, CAST(requests AS TEXT) AS requests, timestamp
    FROM tracker_hits
    WHERE package = ?
    ORDER BY timestamp, domain
"#;

impl Database {
    /// Insert or update an app
    pub async fn upsert_app(&self, identity: &AppIdentity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO apps (package, uid, name)
            VALUES (?, ?, ?)
            ON CONFLICT(package) DO UPDATE SET uid = excluded.uid, name = excluded.name
            "#,
        )
        .bind(identity.package_name())
        .bind(identity.uid())
        .bind(identity.display_name())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert app {}: {}",
                identity.package_name(),
                e
            )))
        })?;

        Ok(())
    }

    /// Get an app by package name
    pub async fn get_app(&self, package_name: &str) -> Result<Option<AppRow>> {
        let row = sqlx::query_as::<_, AppRow>(
            r#"
            SELECT package, uid, name FROM apps WHERE package = ?
            "#,
        )
        .bind(package_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row)
    }

    /// Record a tracker contact for an app that is already known
    pub async fn record_hit(&self, hit: &NewTrackerHit) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO tracker_hits (package, domain, requests, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&hit.package_name)
        .bind(&hit.domain)
        .bind(hit.requests)
        .bind(&hit.timestamp)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.last_insert_rowid())
    }

    /// Number of tracker contacts stored for an app
    pub async fn count_hits(&self, package_name: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracker_hits WHERE package = ?")
            .bind(package_name)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(count)
    }

    /// Delete every tracker contact for an app
    pub async fn clear_hits(&self, package_name: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tracker_hits WHERE package = ?")
            .bind(package_name)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RecordStore for Database {
    /// Packages without an `apps` row have no queryable result.
    async fn query_records(&self, package_name: &str) -> Result<Option<RecordCursor>> {
        if self.get_app(package_name).await?.is_none() {
            return Ok(None);
        }

        let statement = self.pool.prepare(EXPORT_QUERY).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to prepare export query: {}",
                e
            )))
        })?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        let rows = statement
            .query()
            .bind(package_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to query records for {}: {}",
                    package_name, e
                )))
            })?;

        tracing::debug!(package = package_name, rows = rows.len(), "loaded export records");

        let width = columns.len();
        let rows = rows.into_iter().map(move |row| {
            (0..width)
                .map(|i| {
                    row.try_get::<Option<String>, _>(i)
                        .map(Option::unwrap_or_default)
                        .map_err(Error::Sqlx)
                })
                .collect::<Result<ExportRow>>()
        });

        Ok(Some(RecordCursor::new(columns, rows)))
    }
}
