//! The controlling context of an app-details screen
//!
//! A [`DetailsScreen`] owns everything one screen coordinates: the observer
//! registry, the metadata loader, the permission gate, the export job and the
//! share handoff. It is driven by a single-consumer message loop; background
//! tasks never touch screen state directly but post their completion into the
//! loop, and hosts post OS callbacks and user actions through a
//! [`ScreenHandle`].
//!
//! User-visible signals are published as [`Event`]s on a broadcast channel.
//!
//! ```no_run
//! use app_details_core::{
//!     AppIdentity, Config, Database, DetailsScreen, LocalHandoff, PlayStoreProvider,
//!     ScreenServices, StaticCapabilityGate,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> app_details_core::Result<()> {
//! let config = Config::default();
//! let db = Arc::new(Database::new(std::path::Path::new("details.db")).await?);
//! let services = ScreenServices {
//!     records: db.clone(),
//!     metadata: Arc::new(PlayStoreProvider::new(&config.metadata)?),
//!     capabilities: Arc::new(StaticCapabilityGate::granted()),
//!     handoff: Arc::new(LocalHandoff),
//!     preferences: db,
//! };
//!
//! let mut screen = DetailsScreen::new(
//!     AppIdentity::new("com.example.app", 10123, "Example"),
//!     config,
//!     services,
//! )?;
//! let mut events = screen.subscribe();
//! let handle = screen.handle();
//!
//! screen.activate().await;
//! handle.request_export()?;
//! tokio::spawn(async move { screen.run().await });
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::error::{Error, ExportError, Result};
use crate::export::{ExportJob, ExportState, RecordStore};
use crate::metadata::{InfoLoader, MetadataProvider};
use crate::observers::{Observer, ObserverRegistry, Subscription};
use crate::permission::{Access, CapabilityGate, CorrelationToken, PermissionGate};
use crate::preferences::PreferenceStore;
use crate::share::{HandoffService, ShareHandoff, ShareIntent};
use crate::tasks::TaskHandle;
use crate::types::{AppIdentity, AppInfo, Event, ExportOutcome, Generation, InfoUpdate};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the event broadcast channel
const EVENT_CAPACITY: usize = 256;

/// External collaborators a screen works with
#[derive(Clone)]
pub struct ScreenServices {
    /// Source of the exported records
    pub records: Arc<dyn RecordStore>,
    /// Remote lookup of store listing information
    pub metadata: Arc<dyn MetadataProvider>,
    /// OS permission check and request
    pub capabilities: Arc<dyn CapabilityGate>,
    /// OS mechanism for handing files to other processes
    pub handoff: Arc<dyn HandoffService>,
    /// Persisted user preferences
    pub preferences: Arc<dyn PreferenceStore>,
}

/// Messages processed by the screen loop
#[derive(Debug)]
enum ScreenMessage {
    InfoLoaded(Result<InfoUpdate>),
    ExportFinished(Result<ExportOutcome>),
    PermissionResult {
        token: CorrelationToken,
        granted: bool,
    },
    ExportRequested,
    ShareRequested,
    Shutdown,
}

/// Cloneable sender posting messages into a screen's loop
#[derive(Clone, Debug)]
pub struct ScreenHandle {
    tx: mpsc::UnboundedSender<ScreenMessage>,
}

impl ScreenHandle {
    fn send(&self, message: ScreenMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::ScreenClosed)
    }

    /// Deliver the answer to a capability request
    pub fn permission_result(&self, token: CorrelationToken, granted: bool) -> Result<()> {
        self.send(ScreenMessage::PermissionResult { token, granted })
    }

    /// Ask the screen to export its app's records
    pub fn request_export(&self) -> Result<()> {
        self.send(ScreenMessage::ExportRequested)
    }

    /// Ask the screen to share the last successful export
    pub fn share(&self) -> Result<()> {
        self.send(ScreenMessage::ShareRequested)
    }

    /// Ask the screen to tear down and stop its loop
    pub fn shutdown(&self) -> Result<()> {
        self.send(ScreenMessage::Shutdown)
    }
}

/// Controlling context of one app-details screen
pub struct DetailsScreen {
    identity: Arc<AppIdentity>,
    registry: ObserverRegistry,
    loader: InfoLoader,
    permission: PermissionGate,
    export: ExportJob,
    share: ShareHandoff,
    preferences: Arc<dyn PreferenceStore>,
    event_tx: broadcast::Sender<Event>,
    tx: mpsc::UnboundedSender<ScreenMessage>,
    rx: mpsc::UnboundedReceiver<ScreenMessage>,
    cancel: CancellationToken,
    last_export: Option<PathBuf>,
}

impl DetailsScreen {
    /// Create a screen for `identity`
    ///
    /// Nothing runs until [`activate`](Self::activate) or an export request.
    pub fn new(identity: AppIdentity, config: Config, services: ScreenServices) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, _rx) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            identity: Arc::new(identity),
            registry: ObserverRegistry::new(),
            loader: InfoLoader::new(services.metadata, config.metadata.fetch_timeout),
            permission: PermissionGate::new(services.capabilities, config.permission.request_code),
            export: ExportJob::from_config(services.records, &config.export),
            share: ShareHandoff::new(services.handoff, &config.share),
            preferences: services.preferences,
            event_tx,
            tx,
            rx,
            cancel: CancellationToken::new(),
            last_export: None,
        })
    }

    /// The app this screen shows
    pub fn identity(&self) -> &Arc<AppIdentity> {
        &self.identity
    }

    /// Sender for host callbacks and user actions
    pub fn handle(&self) -> ScreenHandle {
        ScreenHandle {
            tx: self.tx.clone(),
        }
    }

    /// Subscribe to the screen's events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Register an observer for "app info loaded" notifications
    pub fn register_observer(&self, observer: Arc<dyn Observer>) -> Subscription {
        self.registry.register(observer)
    }

    /// The observer registry of this screen
    pub fn observers(&self) -> &ObserverRegistry {
        &self.registry
    }

    /// Cached store listing for this screen's app
    pub fn cached_info(&self) -> Option<Arc<AppInfo>> {
        self.loader.cache().get(self.identity.package_name())
    }

    /// Current state of the export job
    pub fn export_state(&self) -> ExportState {
        self.export.state()
    }

    /// Where this screen's export file is written
    pub fn export_path(&self) -> PathBuf {
        self.export.export_path(&self.identity)
    }

    /// File written by the last successful export
    pub fn last_export(&self) -> Option<&Path> {
        self.last_export.as_deref()
    }

    /// Whether the screen has been torn down
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Post the result of `handle` back into the loop once the task completes
    fn forward<T, F>(&self, handle: TaskHandle<T>, wrap: F)
    where
        T: Send + 'static,
        F: FnOnce(Result<T>) -> ScreenMessage + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = handle.wait().await;
            tx.send(wrap(result)).ok();
        });
    }

    /// Read the consent flag once and start the metadata fetch if allowed
    ///
    /// Returns the generation of the started fetch.
    pub async fn activate(&mut self) -> Option<Generation> {
        if self.is_closed() {
            return None;
        }

        let consent = match self.preferences.metadata_consent().await {
            Ok(consent) => consent,
            Err(e) => {
                warn!(error = %e, "failed to read metadata consent, assuming none");
                false
            }
        };

        let handle = self
            .loader
            .start(&self.identity, consent, self.cancel.child_token())?;
        let package_name = self.identity.package_name().to_string();
        let generation = self.loader.cache().latest_generation(&package_name)?;

        self.emit_event(Event::InfoRequested {
            package_name,
            generation,
        });
        self.forward(handle, ScreenMessage::InfoLoaded);
        Some(generation)
    }

    /// Export this screen's records, asking for the write capability first
    ///
    /// While an export is active the request is dropped with
    /// [`Event::ExportIgnored`]. Without the capability a request is issued
    /// and the export resumes when the matching grant arrives.
    pub fn request_export(&mut self) {
        if self.is_closed() {
            return;
        }

        let state = self.export.state();
        if state != ExportState::Idle {
            debug!(%state, "export already in progress");
            self.emit_event(Event::ExportIgnored {
                state: state.to_string(),
            });
            return;
        }

        match self.permission.ensure_granted() {
            Access::Granted => self.start_export(),
            Access::Pending(token) => self.emit_event(Event::PermissionRequested { token }),
        }
    }

    fn start_export(&mut self) {
        match self.export.trigger(&self.identity, self.cancel.child_token()) {
            Ok(handle) => {
                self.emit_event(Event::ExportStarted {
                    package_name: self.identity.package_name().to_string(),
                });
                self.forward(handle, ScreenMessage::ExportFinished);
            }
            Err(Error::Export(ExportError::Busy { state })) => {
                self.emit_event(Event::ExportIgnored { state });
            }
            Err(e) => warn!(error = %e, "failed to start export"),
        }
    }

    /// Share the file of the last successful export
    pub fn share_export(&self) -> Result<ShareIntent> {
        let result = match self.last_export.as_deref() {
            Some(path) => self.share.share(path),
            None => Err(Error::Handoff("nothing has been exported yet".to_string())),
        };

        match &result {
            Ok(intent) => self.emit_event(Event::Shared {
                path: intent.reference.path.clone(),
            }),
            Err(e) => {
                warn!(error = %e, "share failed");
                self.emit_event(Event::ShareFailed {
                    error: e.to_string(),
                });
            }
        }
        result
    }

    /// Cancel every running task; later completions are dropped
    pub fn teardown(&mut self) {
        if !self.cancel.is_cancelled() {
            info!(package = %self.identity.package_name(), "tearing down details screen");
            self.cancel.cancel();
        }
    }

    /// Handle the next message
    ///
    /// Returns false once the screen has been shut down.
    pub async fn process_next(&mut self) -> bool {
        let Some(message) = self.rx.recv().await else {
            return false;
        };
        self.handle_message(message)
    }

    /// Process messages until shut down
    pub async fn run(&mut self) {
        while self.process_next().await {}
        debug!(package = %self.identity.package_name(), "details screen loop stopped");
    }

    fn handle_message(&mut self, message: ScreenMessage) -> bool {
        match message {
            ScreenMessage::InfoLoaded(result) => self.on_info_loaded(result),
            ScreenMessage::ExportFinished(result) => self.on_export_finished(result),
            ScreenMessage::PermissionResult { token, granted } => {
                self.on_permission_result(token, granted)
            }
            ScreenMessage::ExportRequested => self.request_export(),
            ScreenMessage::ShareRequested => {
                // Failures are published as events
                self.share_export().ok();
            }
            ScreenMessage::Shutdown => {
                self.teardown();
                return false;
            }
        }
        true
    }

    fn on_info_loaded(&mut self, result: Result<InfoUpdate>) {
        let update = match result {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "metadata task ended without a result");
                return;
            }
        };

        if self.is_closed() {
            debug!(generation = update.generation.get(), "screen closed, dropping metadata");
            return;
        }
        if !self
            .loader
            .cache()
            .is_current(&update.package_name, update.generation)
        {
            debug!(
                package = %update.package_name,
                generation = update.generation.get(),
                "dropping metadata from superseded fetch"
            );
            return;
        }

        self.registry.notify_all(&update);
        self.emit_event(Event::InfoLoaded {
            package_name: update.package_name,
            generation: update.generation,
            available: update.status.is_available(),
        });
    }

    fn on_export_finished(&mut self, result: Result<ExportOutcome>) {
        if !self.export.acknowledge() {
            self.export.abandon();
        }
        if self.is_closed() {
            debug!(package = %self.identity.package_name(), "screen closed, dropping export outcome");
            return;
        }

        let outcome = result.unwrap_or_else(|e| {
            ExportOutcome::Failed(ExportError::WriteFailed {
                path: self.export_path(),
                reason: e.to_string(),
            })
        });

        match outcome {
            ExportOutcome::Succeeded { path, rows } => {
                self.last_export = Some(path.clone());
                self.emit_event(Event::Exported { path, rows });
            }
            ExportOutcome::Failed(error) => {
                self.emit_event(Event::ExportFailed { error });
            }
        }
    }

    fn on_permission_result(&mut self, token: CorrelationToken, granted: bool) {
        match self.permission.resolve(token, granted) {
            Some(true) => {
                if !self.is_closed() {
                    self.start_export();
                }
            }
            Some(false) => self.emit_event(Event::PermissionDenied),
            None => {}
        }
    }
}

impl Drop for DetailsScreen {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
