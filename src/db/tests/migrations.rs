use crate::db::*;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_database_creation() {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path();

    let db = Database::new(db_path).await.unwrap();

    // Verify tables exist
    let mut conn = db.pool.acquire().await.unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(&mut *conn)
            .await
            .unwrap();

    assert!(tables.contains(&"apps".to_string()));
    assert!(tables.contains(&"tracker_hits".to_string()));
    assert!(tables.contains(&"preferences".to_string()));
    assert!(tables.contains(&"schema_version".to_string()));

    drop(conn);
    db.close().await;
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path();

    let db = Database::new(db_path).await.unwrap();
    assert_eq!(db.schema_version().await.unwrap(), 1);
    db.close().await;

    // Reopening must not re-run v1 (CREATE TABLE without IF NOT EXISTS would fail)
    let db = Database::new(db_path).await.unwrap();
    assert_eq!(db.schema_version().await.unwrap(), 1);
    db.close().await;
}

#[tokio::test]
async fn test_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("details.db");

    let db = Database::new(&db_path).await.unwrap();

    assert!(db_path.exists());
    db.close().await;
}
