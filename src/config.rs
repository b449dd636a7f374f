//! Configuration types for app-details-core

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Export destination configuration
///
/// Groups settings that decide where the CSV export lands.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Shared storage root the destination directory is created under (default: ".")
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Name of the well-known export subdirectory (default: "trackercontrol")
    #[serde(default = "default_export_dir_name")]
    pub export_dir_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            export_dir_name: default_export_dir_name(),
        }
    }
}

impl ExportConfig {
    /// Directory every export for this screen is written into
    pub fn destination_dir(&self) -> PathBuf {
        self.storage_root.join(&self.export_dir_name)
    }
}

/// Metadata lookup configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Upper bound for a single provider call (default: 10 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Store listing page queried by [`PlayStoreProvider`](crate::metadata::PlayStoreProvider)
    #[serde(default = "default_store_url")]
    pub store_url: String,

    /// Listing language requested from the store (default: "en")
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: default_fetch_timeout(),
            store_url: default_store_url(),
            language: default_language(),
        }
    }
}

/// Share action configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShareConfig {
    /// Authority the handoff service issues scoped references under
    #[serde(default = "default_authority")]
    pub authority: String,

    /// Content type attached to the share action (default: "application/csv")
    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    /// Title of the target chooser (default: "Share CSV")
    #[serde(default = "default_chooser_title")]
    pub chooser_title: String,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            authority: default_authority(),
            mime_type: default_mime_type(),
            chooser_title: default_chooser_title(),
        }
    }
}

/// Capability request configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermissionConfig {
    /// Request code used to correlate grant/deny callbacks (default: 1)
    #[serde(default = "default_request_code")]
    pub request_code: u32,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            request_code: default_request_code(),
        }
    }
}

/// Main configuration for a details screen
///
/// Sub-config fields are flattened, so the JSON form is a single flat object:
///
/// ```
/// use app_details_core::Config;
///
/// let config = Config::from_json(r#"{"storage_root": "/sdcard", "fetch_timeout": 5}"#).unwrap();
/// assert_eq!(config.export.destination_dir().to_str(), Some("/sdcard/trackercontrol"));
/// assert_eq!(config.metadata.fetch_timeout.as_secs(), 5);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Export destination settings
    #[serde(flatten)]
    pub export: ExportConfig,

    /// Metadata lookup settings
    #[serde(flatten)]
    pub metadata: MetadataConfig,

    /// Share action settings
    #[serde(flatten)]
    pub share: ShareConfig,

    /// Capability request settings
    #[serde(flatten)]
    pub permission: PermissionConfig,
}

impl Config {
    /// Parse a configuration from JSON, filling missing keys with defaults, and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings that would otherwise fail late, at export or fetch time
    pub fn validate(&self) -> Result<()> {
        let dir_name = self.export.export_dir_name.trim();
        if dir_name.is_empty() {
            return Err(Error::Config {
                message: "export directory name must not be empty".to_string(),
                key: Some("export_dir_name".to_string()),
            });
        }
        if dir_name.contains(['/', '\\']) || dir_name == "." || dir_name == ".." {
            return Err(Error::Config {
                message: format!(
                    "export directory name '{}' must be a single path component",
                    dir_name
                ),
                key: Some("export_dir_name".to_string()),
            });
        }
        if self.metadata.fetch_timeout.is_zero() {
            return Err(Error::Config {
                message: "metadata fetch timeout must be greater than zero".to_string(),
                key: Some("fetch_timeout".to_string()),
            });
        }
        if self.share.mime_type.trim().is_empty() {
            return Err(Error::Config {
                message: "share MIME type must not be empty".to_string(),
                key: Some("mime_type".to_string()),
            });
        }
        Ok(())
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_export_dir_name() -> String {
    "trackercontrol".to_string()
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_store_url() -> String {
    "https://play.google.com/store/apps/details".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_authority() -> String {
    "net.kollnig.missioncontrol.fileprovider".to_string()
}

fn default_mime_type() -> String {
    "application/csv".to_string()
}

fn default_chooser_title() -> String {
    "Share CSV".to_string()
}

fn default_request_code() -> u32 {
    1
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
