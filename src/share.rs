//! Handing a finished export to another process.

use crate::config::ShareConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Scoped reference to a file that another process may read
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentReference {
    /// Opaque reference handed to the receiver
    pub uri: String,
    /// File the reference resolves to
    pub path: PathBuf,
}

/// A share action as dispatched to the handoff service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareIntent {
    /// Reference to the shared file
    pub reference: ContentReference,
    /// Content type of the file
    pub mime_type: String,
    /// Whether the receiver gets read access to the reference
    pub grant_read: bool,
    /// Title of the target chooser
    pub chooser_title: String,
}

/// OS-level mechanism exposing files to other processes
pub trait HandoffService: Send + Sync {
    /// Issue a scoped reference for `path` under `authority`
    fn scoped_reference(&self, path: &Path, authority: &str) -> Result<ContentReference>;

    /// Present the share action to the user
    fn start_share(&self, intent: &ShareIntent) -> Result<()>;
}

/// Handoff for hosts without a sharing mechanism
///
/// References are plain `file://` URLs and starting a share only logs it.
#[derive(Debug, Default)]
pub struct LocalHandoff;

impl HandoffService for LocalHandoff {
    fn scoped_reference(&self, path: &Path, _authority: &str) -> Result<ContentReference> {
        let absolute = std::fs::canonicalize(path)?;
        let uri = Url::from_file_path(&absolute).map_err(|()| {
            Error::Handoff(format!("cannot build a reference for {}", absolute.display()))
        })?;

        Ok(ContentReference {
            uri: uri.to_string(),
            path: absolute,
        })
    }

    fn start_share(&self, intent: &ShareIntent) -> Result<()> {
        info!(uri = %intent.reference.uri, mime_type = %intent.mime_type, "share requested");
        Ok(())
    }
}

/// Builds and dispatches share actions for exported files
pub struct ShareHandoff {
    service: Arc<dyn HandoffService>,
    config: ShareConfig,
}

impl ShareHandoff {
    /// Create a handoff using `service` and the configured share settings
    pub fn new(service: Arc<dyn HandoffService>, config: &ShareConfig) -> Self {
        Self {
            service,
            config: config.clone(),
        }
    }

    /// Share the file at `path`
    ///
    /// Fails with [`Error::Handoff`] when the file does not exist or the
    /// service refuses the reference or the action. Returns the dispatched intent.
    pub fn share(&self, path: &Path) -> Result<ShareIntent> {
        if !path.is_file() {
            return Err(Error::Handoff(format!(
                "export file {} does not exist",
                path.display()
            )));
        }

        let reference = self
            .service
            .scoped_reference(path, &self.config.authority)?;
        debug!(uri = %reference.uri, path = %path.display(), "scoped reference issued");

        let intent = ShareIntent {
            reference,
            mime_type: self.config.mime_type.clone(),
            grant_read: true,
            chooser_title: self.config.chooser_title.clone(),
        };
        self.service.start_share(&intent)?;

        info!(path = %path.display(), "export handed off");
        Ok(intent)
    }
}
