//! Test fixtures: recording collaborators and a seeded database

use app_details_core::db::NewTrackerHit;
use app_details_core::share::ContentReference;
use app_details_core::{
    AppIdentity, AppInfo, Database, HandoffService, InfoUpdate, MetadataProvider, Observer,
    Result, ShareIntent,
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

/// Package used by every integration scenario
pub const PACKAGE: &str = "com.example.app";

/// Identity of the scenario app
pub fn identity() -> AppIdentity {
    AppIdentity::new(PACKAGE, 10123, "Example")
}

/// Database in `dir` holding one tracker contact for the scenario app
pub async fn seeded_database(dir: &TempDir) -> Database {
    let db = Database::new(&dir.path().join("details.db"))
        .await
        .expect("open database");
    db.upsert_app(&identity()).await.expect("insert app");
    db.record_hit(&NewTrackerHit {
        package_name: PACKAGE.to_string(),
        domain: "ads.example.com".to_string(),
        requests: 12,
        timestamp: "2020-01-01".to_string(),
    })
    .await
    .expect("insert hit");
    db
}

/// Metadata provider answering with a fixed listing
pub struct ListingProvider;

#[async_trait]
impl MetadataProvider for ListingProvider {
    async fn fetch(&self, package_name: &str) -> Result<AppInfo> {
        Ok(AppInfo {
            title: format!("Listing for {}", package_name),
            developer: Some("Example Labs".to_string()),
            summary: None,
            icon_url: None,
            store_url: None,
            fetched_at: chrono::Utc::now(),
        })
    }
}

/// Handoff service remembering every dispatched share
#[derive(Default)]
pub struct RecordingHandoff {
    pub shared: Mutex<Vec<ShareIntent>>,
}

impl HandoffService for RecordingHandoff {
    fn scoped_reference(&self, path: &Path, authority: &str) -> Result<ContentReference> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(ContentReference {
            uri: format!("content://{}/exports/{}", authority, name),
            path: path.to_path_buf(),
        })
    }

    fn start_share(&self, intent: &ShareIntent) -> Result<()> {
        self.shared.lock().unwrap().push(intent.clone());
        Ok(())
    }
}

/// Observer remembering every update
#[derive(Default)]
pub struct RecordingObserver {
    pub updates: Mutex<Vec<InfoUpdate>>,
}

impl Observer for RecordingObserver {
    fn on_app_info_loaded(&self, update: &InfoUpdate) -> Result<()> {
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}
