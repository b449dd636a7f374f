use crate::db::*;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_unset_preference_is_none() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert_eq!(db.get_bool_preference("missing").await.unwrap(), None);

    db.close().await;
}

#[tokio::test]
async fn test_set_and_overwrite_preference() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.set_bool_preference("contact_metadata_provider", true)
        .await
        .unwrap();
    assert_eq!(
        db.get_bool_preference("contact_metadata_provider")
            .await
            .unwrap(),
        Some(true)
    );

    db.set_bool_preference("contact_metadata_provider", false)
        .await
        .unwrap();
    assert_eq!(
        db.get_bool_preference("contact_metadata_provider")
            .await
            .unwrap(),
        Some(false)
    );

    db.close().await;
}

#[tokio::test]
async fn test_preference_survives_reopen() {
    let temp_file = NamedTempFile::new().unwrap();

    let db = Database::new(temp_file.path()).await.unwrap();
    db.set_bool_preference("flag", true).await.unwrap();
    db.close().await;

    let db = Database::new(temp_file.path()).await.unwrap();
    assert_eq!(db.get_bool_preference("flag").await.unwrap(), Some(true));
    db.close().await;
}
