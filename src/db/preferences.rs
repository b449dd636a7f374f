//! Persisted user preferences.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Read a boolean preference, `None` when it was never set
    pub async fn get_bool_preference(&self, key: &str) -> Result<Option<bool>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to read preference {}: {}",
                        key, e
                    )))
                })?;

        Ok(value.map(|v| v == "true"))
    }

    /// Store a boolean preference
    pub async fn set_bool_preference(&self, key: &str, value: bool) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let value = if value { "true" } else { "false" };
        sqlx::query(
            r#"
            INSERT INTO preferences (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to store preference {}: {}",
                key, e
            )))
        })?;

        Ok(())
    }
}
