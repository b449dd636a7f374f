//! User preferences consulted by a details screen.

use crate::db::Database;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// Key of the persisted "may contact the metadata provider" flag
pub const CONSENT_KEY: &str = "contact_metadata_provider";

/// Source of persisted user preferences
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Whether the user allowed contacting the metadata provider (false when unset)
    async fn metadata_consent(&self) -> Result<bool>;
}

/// Preferences held in memory
#[derive(Debug, Default)]
pub struct StaticPreferences {
    consent: AtomicBool,
}

impl StaticPreferences {
    /// Preferences with the given consent flag
    pub fn new(metadata_consent: bool) -> Self {
        Self {
            consent: AtomicBool::new(metadata_consent),
        }
    }

    /// Change the consent flag
    pub fn set_metadata_consent(&self, consent: bool) {
        self.consent.store(consent, Ordering::SeqCst);
    }
}

#[async_trait]
impl PreferenceStore for StaticPreferences {
    async fn metadata_consent(&self) -> Result<bool> {
        Ok(self.consent.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl PreferenceStore for Database {
    async fn metadata_consent(&self) -> Result<bool> {
        Ok(self
            .get_bool_preference(CONSENT_KEY)
            .await?
            .unwrap_or(false))
    }
}
