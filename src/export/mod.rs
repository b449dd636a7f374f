//! CSV export of stored records
//!
//! An [`ExportJob`] serializes every record the [`RecordStore`] holds for one app
//! into `{destination}/{package}.csv`. The job is a small state machine:
//!
//! ```text
//! Idle -> Preparing -> Running -> Completed(succeeded) -> Idle
//! ```
//!
//! Only an `Idle` job accepts a trigger, so at most one run writes the
//! destination at a time. The controlling context returns the job to `Idle`
//! with [`ExportJob::acknowledge`] once it has consumed the outcome.
//!
//! ## Submodules
//!
//! - [`store`] - the record store trait, cursor and in-memory store
//! - [`writer`] - CSV serialization

mod store;
mod writer;

pub use store::{MemoryRecordStore, RecordCursor, RecordStore};

use crate::config::ExportConfig;
use crate::error::{Error, ExportError, Result};
use crate::tasks::{TaskHandle, spawn_task};
use crate::types::{AppIdentity, ExportOutcome};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where an export job is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportState {
    /// Ready to accept a trigger
    Idle,
    /// Creating the destination directory
    Preparing,
    /// Writing the file
    Running,
    /// Finished; waiting for the controlling context to consume the outcome
    Completed {
        /// Whether the run produced a file
        succeeded: bool,
    },
}

impl ExportState {
    /// Whether a run is in progress
    pub fn is_active(&self) -> bool {
        matches!(self, ExportState::Preparing | ExportState::Running)
    }
}

impl std::fmt::Display for ExportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportState::Idle => write!(f, "idle"),
            ExportState::Preparing => write!(f, "preparing"),
            ExportState::Running => write!(f, "running"),
            ExportState::Completed { succeeded: true } => write!(f, "completed"),
            ExportState::Completed { succeeded: false } => write!(f, "failed"),
        }
    }
}

/// Exports the records of one app to a CSV file (cloneable - clones share state)
#[derive(Clone)]
pub struct ExportJob {
    store: Arc<dyn RecordStore>,
    destination: PathBuf,
    state: Arc<Mutex<ExportState>>,
}

impl ExportJob {
    /// Create a job writing into `destination`
    pub fn new(store: Arc<dyn RecordStore>, destination: impl Into<PathBuf>) -> Self {
        Self {
            store,
            destination: destination.into(),
            state: Arc::new(Mutex::new(ExportState::Idle)),
        }
    }

    /// Create a job writing into the configured destination directory
    pub fn from_config(store: Arc<dyn RecordStore>, config: &ExportConfig) -> Self {
        Self::new(store, config.destination_dir())
    }

    fn lock(&self) -> MutexGuard<'_, ExportState> {
        lock_state(&self.state)
    }

    /// Current lifecycle state
    pub fn state(&self) -> ExportState {
        *self.lock()
    }

    /// Directory exports are written into
    pub fn destination_dir(&self) -> &Path {
        &self.destination
    }

    /// Deterministic export file path for `identity`
    pub fn export_path(&self, identity: &AppIdentity) -> PathBuf {
        self.destination
            .join(format!("{}.csv", identity.package_name()))
    }

    /// Start an export run for `identity`
    ///
    /// Fails with [`ExportError::Busy`] and starts nothing unless the job is
    /// `Idle`. The run observes `cancel` between steps; a cancelled run ends
    /// with [`ExportError::Cancelled`].
    pub fn trigger(
        &self,
        identity: &AppIdentity,
        cancel: CancellationToken,
    ) -> Result<TaskHandle<ExportOutcome>> {
        {
            let mut state = self.lock();
            if *state != ExportState::Idle {
                debug!(package = %identity.package_name(), state = %*state, "export trigger ignored");
                return Err(Error::Export(ExportError::Busy {
                    state: state.to_string(),
                }));
            }
            *state = ExportState::Preparing;
        }

        let run = ExportRun {
            store: Arc::clone(&self.store),
            state: Arc::clone(&self.state),
            destination: self.destination.clone(),
            path: self.export_path(identity),
            package_name: identity.package_name().to_string(),
            cancel: cancel.clone(),
        };
        info!(package = %run.package_name, path = %run.path.display(), "starting export");

        Ok(spawn_task(cancel, run.execute()))
    }

    /// Consume a completed run, returning the job to `Idle`
    ///
    /// Returns false (and changes nothing) when no completed run is waiting.
    pub fn acknowledge(&self) -> bool {
        let mut state = self.lock();
        if matches!(*state, ExportState::Completed { .. }) {
            *state = ExportState::Idle;
            true
        } else {
            false
        }
    }

    /// Return to `Idle` after a run ended without producing an outcome
    pub(crate) fn abandon(&self) {
        let mut state = self.lock();
        if *state != ExportState::Idle {
            warn!(state = %*state, "export run ended without an outcome, resetting job");
            *state = ExportState::Idle;
        }
    }
}

fn lock_state(state: &Mutex<ExportState>) -> MutexGuard<'_, ExportState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything one background run needs, moved into its task
struct ExportRun {
    store: Arc<dyn RecordStore>,
    state: Arc<Mutex<ExportState>>,
    destination: PathBuf,
    path: PathBuf,
    package_name: String,
    cancel: CancellationToken,
}

impl ExportRun {
    fn set_state(&self, next: ExportState) {
        *lock_state(&self.state) = next;
    }

    fn check_cancelled(&self) -> std::result::Result<(), ExportError> {
        if self.cancel.is_cancelled() {
            Err(ExportError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn execute(self) -> ExportOutcome {
        let result = self.prepare_and_write().await;
        self.set_state(ExportState::Completed {
            succeeded: result.is_ok(),
        });

        match result {
            Ok(rows) => {
                info!(package = %self.package_name, path = %self.path.display(), rows, "export completed");
                ExportOutcome::Succeeded {
                    path: self.path,
                    rows,
                }
            }
            Err(e) => {
                warn!(package = %self.package_name, error = %e, "export failed");
                ExportOutcome::Failed(e)
            }
        }
    }

    async fn prepare_and_write(&self) -> std::result::Result<usize, ExportError> {
        self.check_cancelled()?;
        tokio::fs::create_dir_all(&self.destination)
            .await
            .map_err(|e| ExportError::PreparationFailed {
                path: self.destination.clone(),
                reason: e.to_string(),
            })?;

        self.check_cancelled()?;
        self.set_state(ExportState::Running);

        let file = tokio::fs::File::create(&self.path)
            .await
            .map_err(|e| ExportError::WriteFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        let file = file.into_std().await;

        let result = self.write(file).await;
        if result.is_err() {
            self.remove_partial_file().await;
        }
        result
    }

    async fn write(&self, file: std::fs::File) -> std::result::Result<usize, ExportError> {
        self.check_cancelled()?;

        let cursor = match self.store.query_records(&self.package_name).await {
            Ok(Some(cursor)) => cursor,
            Ok(None) => {
                return Err(ExportError::StoreUnavailable {
                    package: self.package_name.clone(),
                });
            }
            Err(e) => {
                return Err(ExportError::WriteFailed {
                    path: self.path.clone(),
                    reason: format!("record query failed: {}", e),
                });
            }
        };
        debug!(package = %self.package_name, columns = cursor.columns().len(), "record cursor opened");

        self.check_cancelled()?;

        let path = self.path.clone();
        let cancel = self.cancel.clone();
        tokio::task::spawn_blocking(move || writer::write_records(file, &path, cursor, &cancel))
            .await
            .map_err(|e| ExportError::WriteFailed {
                path: self.path.clone(),
                reason: format!("writer task failed: {}", e),
            })?
    }

    async fn remove_partial_file(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "removed partial export"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove partial export")
            }
        }
    }
}
