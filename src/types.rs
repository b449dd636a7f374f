//! Core types for app-details-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ExportError;

/// The app a details screen operates on
///
/// Supplied once when the screen is created and never modified afterwards;
/// the fields are private so a shared `Arc<AppIdentity>` cannot drift.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppIdentity {
    package_name: String,
    uid: i64,
    display_name: String,
}

impl AppIdentity {
    /// Create a new identity
    pub fn new(
        package_name: impl Into<String>,
        uid: i64,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            uid,
            display_name: display_name.into(),
        }
    }

    /// Package name, the key for records, metadata and the export file name
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Linux user id of the app (-1 when unknown)
    pub fn uid(&self) -> i64 {
        self.uid
    }

    /// Human readable app name
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl std::fmt::Display for AppIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name, self.package_name)
    }
}

/// Tag distinguishing successive metadata fetches for the same package
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    /// The generation following this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store listing information for an app
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    /// Listing title
    pub title: String,
    /// Developer or publisher name
    pub developer: Option<String>,
    /// Short description
    pub summary: Option<String>,
    /// Icon image URL
    pub icon_url: Option<String>,
    /// Listing page the information was read from
    pub store_url: Option<String>,
    /// When the listing was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Outcome of one metadata fetch, as seen by observers
#[derive(Clone, Debug)]
pub enum InfoStatus {
    /// The fetch succeeded and the cache holds this record
    Available(Arc<AppInfo>),
    /// The fetch failed; the cache keeps whatever it held before
    Unavailable {
        /// Why no data could be loaded
        reason: String,
    },
}

impl InfoStatus {
    /// The loaded record, if any
    pub fn info(&self) -> Option<&Arc<AppInfo>> {
        match self {
            InfoStatus::Available(info) => Some(info),
            InfoStatus::Unavailable { .. } => None,
        }
    }

    /// Whether the fetch produced data
    pub fn is_available(&self) -> bool {
        matches!(self, InfoStatus::Available(_))
    }
}

/// Notification payload delivered to observers after a fetch completes
#[derive(Clone, Debug)]
pub struct InfoUpdate {
    /// Package the fetch was for
    pub package_name: String,
    /// Generation of the fetch that produced this update
    pub generation: Generation,
    /// What the fetch produced
    pub status: InfoStatus,
}

/// One record from the record store, every value already rendered as text
pub type ExportRow = Vec<String>;

/// Terminal result of one export run
///
/// Either a complete success carrying the file path or a failure carrying its
/// cause; there is no partially populated form.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The file was written completely
    Succeeded {
        /// Final location of the export file
        path: PathBuf,
        /// Number of data rows written (header excluded)
        rows: usize,
    },
    /// The run failed; no usable file exists
    Failed(ExportError),
}

impl ExportOutcome {
    /// Whether the export produced a file
    pub fn succeeded(&self) -> bool {
        matches!(self, ExportOutcome::Succeeded { .. })
    }

    /// Path of the written file for successful runs
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            ExportOutcome::Succeeded { path, .. } => Some(path),
            ExportOutcome::Failed(_) => None,
        }
    }

    /// The failure for unsuccessful runs
    pub fn error(&self) -> Option<&ExportError> {
        match self {
            ExportOutcome::Succeeded { .. } => None,
            ExportOutcome::Failed(err) => Some(err),
        }
    }
}

/// Events published by a details screen
///
/// These are the user-visible signals of the screen: hosts subscribe and render
/// them as toasts, snackbars or log lines.
#[derive(Clone, Debug)]
pub enum Event {
    /// A metadata fetch was started
    InfoRequested {
        /// Package being looked up
        package_name: String,
        /// Generation of the fetch
        generation: Generation,
    },

    /// A metadata fetch completed and observers were notified
    InfoLoaded {
        /// Package that was looked up
        package_name: String,
        /// Generation of the fetch
        generation: Generation,
        /// Whether data is available
        available: bool,
    },

    /// The capability is missing and a request was issued
    PermissionRequested {
        /// Token the grant/deny callback must carry
        token: crate::permission::CorrelationToken,
    },

    /// The capability request was denied; the export was not attempted
    PermissionDenied,

    /// An export run was started
    ExportStarted {
        /// Package being exported
        package_name: String,
    },

    /// An export trigger arrived while another run was active and was dropped
    ExportIgnored {
        /// State of the active run
        state: String,
    },

    /// The export finished and the file can be shared
    Exported {
        /// Location of the written file
        path: PathBuf,
        /// Number of data rows written
        rows: usize,
    },

    /// The export failed
    ExportFailed {
        /// Cause of the failure
        error: ExportError,
    },

    /// A share action was handed to the handoff service
    Shared {
        /// File that was shared
        path: PathBuf,
    },

    /// The share action could not be started
    ShareFailed {
        /// Why the handoff failed
        error: String,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_accessors() {
        let identity = AppIdentity::new("com.example.app", 1000, "Example");
        assert_eq!(identity.package_name(), "com.example.app");
        assert_eq!(identity.uid(), 1000);
        assert_eq!(identity.display_name(), "Example");
        assert_eq!(identity.to_string(), "Example (com.example.app)");
    }

    #[test]
    fn generation_is_monotonic() {
        let first = Generation::default();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn outcome_accessors() {
        let ok = ExportOutcome::Succeeded {
            path: PathBuf::from("trackercontrol/com.example.app.csv"),
            rows: 1,
        };
        assert!(ok.succeeded());
        assert_eq!(
            ok.file_path(),
            Some(Path::new("trackercontrol/com.example.app.csv"))
        );
        assert!(ok.error().is_none());

        let failed = ExportOutcome::Failed(ExportError::Cancelled);
        assert!(!failed.succeeded());
        assert!(failed.file_path().is_none());
        assert_eq!(failed.error(), Some(&ExportError::Cancelled));
    }
}
