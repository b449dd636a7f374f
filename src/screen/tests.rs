use super::*;
use crate::config::ExportConfig;
use crate::error::MetadataError;
use crate::export::MemoryRecordStore;
use crate::permission::StaticCapabilityGate;
use crate::preferences::StaticPreferences;
use crate::share::ContentReference;
use crate::types::{ExportRow, InfoStatus};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

fn identity() -> AppIdentity {
    AppIdentity::new("com.example.app", 10123, "Example")
}

fn strings(values: &[&str]) -> ExportRow {
    values.iter().map(|s| s.to_string()).collect()
}

struct FixedProvider(std::result::Result<&'static str, MetadataError>);

#[async_trait]
impl MetadataProvider for FixedProvider {
    async fn fetch(&self, _package_name: &str) -> Result<AppInfo> {
        match &self.0 {
            Ok(title) => Ok(AppInfo {
                title: title.to_string(),
                developer: None,
                summary: None,
                icon_url: None,
                store_url: None,
                fetched_at: chrono::Utc::now(),
            }),
            Err(e) => Err(e.clone().into()),
        }
    }
}

struct HangingProvider;

#[async_trait]
impl MetadataProvider for HangingProvider {
    async fn fetch(&self, _package_name: &str) -> Result<AppInfo> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Holds its first fetch until released; later fetches answer at once
#[derive(Default)]
struct GatedProvider {
    calls: std::sync::atomic::AtomicUsize,
    release: tokio::sync::Notify,
}

#[async_trait]
impl MetadataProvider for GatedProvider {
    async fn fetch(&self, _package_name: &str) -> Result<AppInfo> {
        let call = self
            .calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let title = if call == 0 {
            self.release.notified().await;
            "first"
        } else {
            "second"
        };
        Ok(AppInfo {
            title: title.to_string(),
            developer: None,
            summary: None,
            icon_url: None,
            store_url: None,
            fetched_at: chrono::Utc::now(),
        })
    }
}

#[derive(Default)]
struct RecordingHandoff {
    shared: Mutex<Vec<ShareIntent>>,
}

impl HandoffService for RecordingHandoff {
    fn scoped_reference(&self, path: &Path, authority: &str) -> Result<ContentReference> {
        Ok(ContentReference {
            uri: format!("content://{}/{}", authority, path.display()),
            path: path.to_path_buf(),
        })
    }

    fn start_share(&self, intent: &ShareIntent) -> Result<()> {
        self.shared.lock().unwrap().push(intent.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingObserver {
    updates: Mutex<Vec<InfoUpdate>>,
}

impl Observer for RecordingObserver {
    fn on_app_info_loaded(&self, update: &InfoUpdate) -> Result<()> {
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

struct Harness {
    _root: TempDir,
    screen: DetailsScreen,
    events: broadcast::Receiver<Event>,
    gate: Arc<StaticCapabilityGate>,
    handoff: Arc<RecordingHandoff>,
}

impl Harness {
    fn new(provider: Arc<dyn MetadataProvider>, consent: bool, gate: StaticCapabilityGate) -> Self {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryRecordStore::new();
        store.insert(
            "com.example.app",
            strings(&["domain", "requests", "timestamp"]),
            vec![strings(&["ads.example.com", "12", "2020-01-01"])],
        );

        let gate = Arc::new(gate);
        let handoff = Arc::new(RecordingHandoff::default());
        let config = Config {
            export: ExportConfig {
                storage_root: root.path().to_path_buf(),
                ..Default::default()
            },
            ..Default::default()
        };
        let services = ScreenServices {
            records: Arc::new(store),
            metadata: provider,
            capabilities: gate.clone(),
            handoff: handoff.clone(),
            preferences: Arc::new(StaticPreferences::new(consent)),
        };

        let screen = DetailsScreen::new(identity(), config, services).unwrap();
        let events = screen.subscribe();
        Self {
            _root: root,
            screen,
            events,
            gate,
            handoff,
        }
    }

    fn granted() -> Self {
        Self::new(
            Arc::new(FixedProvider(Ok("Example"))),
            false,
            StaticCapabilityGate::granted(),
        )
    }

    fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    async fn next(&mut self) -> bool {
        tokio::time::timeout(Duration::from_secs(5), self.screen.process_next())
            .await
            .expect("screen loop stalled")
    }
}

#[tokio::test]
async fn activate_without_consent_does_not_fetch() {
    let mut h = Harness::granted();
    let observer = Arc::new(RecordingObserver::default());
    let _subscription = h.screen.register_observer(observer.clone());

    assert_eq!(h.screen.activate().await, None);

    assert!(h.drain().is_empty());
    assert!(observer.updates.lock().unwrap().is_empty());
    assert!(h.screen.cached_info().is_none());
}

#[tokio::test]
async fn loaded_metadata_notifies_observers_once() {
    let mut h = Harness::new(
        Arc::new(FixedProvider(Ok("Example"))),
        true,
        StaticCapabilityGate::granted(),
    );
    let first = Arc::new(RecordingObserver::default());
    let second = Arc::new(RecordingObserver::default());
    let _a = h.screen.register_observer(first.clone());
    let _b = h.screen.register_observer(second.clone());

    let generation = h.screen.activate().await.unwrap();
    assert!(h.next().await);

    for observer in [&first, &second] {
        let updates = observer.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].generation, generation);
        assert_eq!(updates[0].status.info().unwrap().title, "Example");
    }
    assert_eq!(h.screen.cached_info().unwrap().title, "Example");

    let events = h.drain();
    assert!(matches!(events[0], Event::InfoRequested { .. }));
    assert!(matches!(
        events[1],
        Event::InfoLoaded {
            available: true,
            ..
        }
    ));
}

#[tokio::test]
async fn failed_metadata_still_notifies_unavailable() {
    let mut h = Harness::new(
        Arc::new(FixedProvider(Err(MetadataError::NotFound {
            package: "com.example.app".to_string(),
        }))),
        true,
        StaticCapabilityGate::granted(),
    );
    let observer = Arc::new(RecordingObserver::default());
    let _subscription = h.screen.register_observer(observer.clone());

    h.screen.activate().await.unwrap();
    h.next().await;

    let updates = observer.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert!(matches!(updates[0].status, InfoStatus::Unavailable { .. }));
    assert!(h.screen.cached_info().is_none());
}

#[tokio::test]
async fn granted_export_writes_file_and_offers_share() {
    let mut h = Harness::granted();

    h.screen.request_export();
    assert!(h.next().await);

    let path = h.screen.export_path();
    assert!(path.ends_with("trackercontrol/com.example.app.csv"));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "domain,requests,timestamp\r\nads.example.com,12,2020-01-01\r\n"
    );
    assert_eq!(h.screen.export_state(), ExportState::Idle);
    assert_eq!(h.screen.last_export(), Some(path.as_path()));

    let events = h.drain();
    assert!(matches!(events[0], Event::ExportStarted { .. }));
    match &events[1] {
        Event::Exported { path: exported, rows } => {
            assert_eq!(exported, &path);
            assert_eq!(*rows, 1);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn second_request_while_active_is_ignored() {
    let mut h = Harness::granted();

    h.screen.request_export();
    // The job stays out of Idle until the loop consumes the outcome
    h.screen.request_export();
    h.next().await;

    let events = h.drain();
    let started = events
        .iter()
        .filter(|e| matches!(e, Event::ExportStarted { .. }))
        .count();
    let ignored = events
        .iter()
        .filter(|e| matches!(e, Event::ExportIgnored { .. }))
        .count();
    assert_eq!(started, 1);
    assert_eq!(ignored, 1);
}

#[tokio::test]
async fn denied_permission_writes_nothing() {
    let mut h = Harness::new(
        Arc::new(FixedProvider(Ok("Example"))),
        false,
        StaticCapabilityGate::denied(),
    );

    h.screen.request_export();
    let token = match h.drain().as_slice() {
        [Event::PermissionRequested { token }] => *token,
        other => panic!("unexpected events: {other:?}"),
    };
    assert_eq!(token.request_code, 1);
    assert_eq!(h.gate.requests(), vec![token]);

    h.screen.handle().permission_result(token, false).unwrap();
    h.next().await;

    assert!(matches!(h.drain().as_slice(), [Event::PermissionDenied]));
    assert!(!h.screen.export_path().exists());
    assert_eq!(h.screen.export_state(), ExportState::Idle);
}

#[tokio::test]
async fn grant_callback_resumes_export() {
    let mut h = Harness::new(
        Arc::new(FixedProvider(Ok("Example"))),
        false,
        StaticCapabilityGate::denied(),
    );

    h.screen.request_export();
    let token = h.gate.requests()[0];
    h.drain();

    h.screen.handle().permission_result(token, true).unwrap();
    h.next().await; // permission result starts the export
    h.next().await; // export completion

    assert!(h.screen.export_path().exists());
    let events = h.drain();
    assert!(matches!(events[0], Event::ExportStarted { .. }));
    assert!(matches!(events[1], Event::Exported { rows: 1, .. }));
}

#[tokio::test]
async fn superseded_fetch_does_not_reach_observers() {
    let provider = Arc::new(GatedProvider::default());
    let mut h = Harness::new(provider.clone(), true, StaticCapabilityGate::granted());
    let observer = Arc::new(RecordingObserver::default());
    let _subscription = h.screen.register_observer(observer.clone());

    let first = h.screen.activate().await.unwrap();
    while provider.calls.load(std::sync::atomic::Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    let second = h.screen.activate().await.unwrap();
    assert!(second > first);

    h.next().await; // second fetch answers first
    provider.release.notify_one();
    h.next().await; // first fetch arrives late

    let updates = observer.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].generation, second);
    assert_eq!(updates[0].status.info().unwrap().title, "second");
    drop(updates);
    assert_eq!(h.screen.cached_info().unwrap().title, "second");

    let loaded: Vec<_> = h
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            Event::InfoLoaded { generation, .. } => Some(generation),
            _ => None,
        })
        .collect();
    assert_eq!(loaded, vec![second]);
}

#[tokio::test]
async fn late_grant_after_direct_export_starts_nothing() {
    let mut h = Harness::new(
        Arc::new(FixedProvider(Ok("Example"))),
        false,
        StaticCapabilityGate::denied(),
    );

    h.screen.request_export();
    let token = h.gate.requests()[0];

    // Capability granted out of band, then the user exports again
    h.gate.set_granted(true);
    h.screen.request_export();
    h.next().await;
    assert_eq!(h.screen.export_state(), ExportState::Idle);

    h.screen.handle().permission_result(token, true).unwrap();
    h.next().await;

    let events = h.drain();
    let started = events
        .iter()
        .filter(|e| matches!(e, Event::ExportStarted { .. }))
        .count();
    let exported = events
        .iter()
        .filter(|e| matches!(e, Event::Exported { .. }))
        .count();
    assert_eq!(started, 1);
    assert_eq!(exported, 1);
    assert_eq!(h.screen.export_state(), ExportState::Idle);
}

#[tokio::test]
async fn stale_permission_token_is_ignored() {
    let mut h = Harness::new(
        Arc::new(FixedProvider(Ok("Example"))),
        false,
        StaticCapabilityGate::denied(),
    );

    h.screen.request_export();
    let stale = h.gate.requests()[0];
    h.screen.request_export();
    h.drain();

    h.screen.handle().permission_result(stale, true).unwrap();
    h.next().await;

    assert!(h.drain().is_empty());
    assert!(!h.screen.export_path().exists());
}

#[tokio::test]
async fn share_hands_off_last_export() {
    let mut h = Harness::granted();

    h.screen.request_export();
    h.next().await;
    h.drain();

    h.screen.handle().share().unwrap();
    h.next().await;

    let shared = h.handoff.shared.lock().unwrap();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].mime_type, "application/csv");
    assert!(shared[0].grant_read);
    assert_eq!(shared[0].reference.path, h.screen.export_path());
    drop(shared);

    assert!(matches!(h.drain().as_slice(), [Event::Shared { .. }]));
}

#[tokio::test]
async fn share_before_export_fails() {
    let mut h = Harness::granted();

    assert!(matches!(h.screen.share_export(), Err(Error::Handoff(_))));
    assert!(matches!(h.drain().as_slice(), [Event::ShareFailed { .. }]));
    assert!(h.handoff.shared.lock().unwrap().is_empty());
}

#[tokio::test]
async fn teardown_cancels_fetch_without_notifying() {
    let mut h = Harness::new(Arc::new(HangingProvider), true, StaticCapabilityGate::granted());
    let observer = Arc::new(RecordingObserver::default());
    let _subscription = h.screen.register_observer(observer.clone());

    h.screen.activate().await.unwrap();
    h.screen.teardown();
    assert!(h.screen.is_closed());

    // The cancelled fetch still completes through the loop
    h.next().await;

    assert!(observer.updates.lock().unwrap().is_empty());
    assert!(h.screen.activate().await.is_none());
}

#[tokio::test]
async fn export_finishing_after_teardown_publishes_nothing() {
    let mut h = Harness::granted();

    h.screen.request_export();
    assert!(matches!(h.drain().as_slice(), [Event::ExportStarted { .. }]));
    h.screen.teardown();

    h.next().await;

    assert!(h.drain().is_empty());
    assert!(h.screen.last_export().is_none());
    assert_eq!(h.screen.export_state(), ExportState::Idle);
}

#[tokio::test]
async fn shutdown_message_stops_the_loop() {
    let mut h = Harness::granted();
    let handle = h.screen.handle();

    handle.request_export().unwrap();
    handle.shutdown().unwrap();

    tokio::time::timeout(Duration::from_secs(5), h.screen.run())
        .await
        .unwrap();

    assert!(h.screen.is_closed());
}
