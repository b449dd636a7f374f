//! Background metadata loading
//!
//! The [`InfoLoader`] fetches store listing information for the screen's app off
//! the controlling context and stores it in an [`InfoCache`]. Each fetch is
//! tagged with a [`Generation`]; a result from a fetch that has since been
//! superseded is discarded instead of overwriting newer data.
//!
//! ## Failure policy
//!
//! A failed, timed out or cancelled fetch leaves the cache with whatever it held
//! before and still completes with an [`InfoUpdate`] whose status is
//! [`InfoStatus::Unavailable`], so observers waiting on the fetch can move to a
//! "no data" state instead of waiting forever.

mod play_store;

pub use play_store::PlayStoreProvider;

use crate::error::{Error, MetadataError, Result};
use crate::tasks::{TaskHandle, spawn_task};
use crate::types::{AppIdentity, AppInfo, Generation, InfoStatus, InfoUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Remote lookup service for app listing information
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Look up the listing for `package_name`
    ///
    /// Implementations report a missing listing as
    /// [`MetadataError::NotFound`] and connection problems as
    /// [`MetadataError::Transport`].
    async fn fetch(&self, package_name: &str) -> Result<AppInfo>;
}

#[derive(Default)]
struct Slot {
    latest: Generation,
    stored: Option<(Generation, Arc<AppInfo>)>,
}

/// Result cache keyed by package name
///
/// Entries are replaced wholesale: readers get an `Arc<AppInfo>` that is never
/// modified after it was stored.
#[derive(Clone, Default)]
pub struct InfoCache {
    slots: Arc<RwLock<HashMap<String, Slot>>>,
}

impl InfoCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Slot>> {
        self.slots.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot>> {
        self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new generation for `package_name`, superseding earlier fetches
    pub fn begin(&self, package_name: &str) -> Generation {
        let mut slots = self.write();
        let slot = slots.entry(package_name.to_string()).or_default();
        slot.latest = slot.latest.next();
        slot.latest
    }

    /// Store a fetched record if `generation` is still the latest one begun
    ///
    /// Returns false (and leaves the cache untouched) for stale generations.
    pub fn store(&self, package_name: &str, generation: Generation, info: Arc<AppInfo>) -> bool {
        let mut slots = self.write();
        match slots.get_mut(package_name) {
            Some(slot) if slot.latest == generation => {
                slot.stored = Some((generation, info));
                true
            }
            _ => false,
        }
    }

    /// The most recently stored record for `package_name`
    pub fn get(&self, package_name: &str) -> Option<Arc<AppInfo>> {
        self.read()
            .get(package_name)
            .and_then(|slot| slot.stored.as_ref().map(|(_, info)| Arc::clone(info)))
    }

    /// Generation that produced the stored record
    pub fn stored_generation(&self, package_name: &str) -> Option<Generation> {
        self.read()
            .get(package_name)
            .and_then(|slot| slot.stored.as_ref().map(|(generation, _)| *generation))
    }

    /// Latest generation begun for `package_name`
    pub fn latest_generation(&self, package_name: &str) -> Option<Generation> {
        self.read().get(package_name).map(|slot| slot.latest)
    }

    /// Whether `generation` is the latest fetch begun for `package_name`
    pub fn is_current(&self, package_name: &str, generation: Generation) -> bool {
        self.latest_generation(package_name) == Some(generation)
    }
}

/// Runs metadata fetches in the background and records their results
#[derive(Clone)]
pub struct InfoLoader {
    provider: Arc<dyn MetadataProvider>,
    cache: InfoCache,
    timeout: Duration,
}

impl InfoLoader {
    /// Create a loader with its own cache
    pub fn new(provider: Arc<dyn MetadataProvider>, timeout: Duration) -> Self {
        Self::with_cache(provider, InfoCache::new(), timeout)
    }

    /// Create a loader writing into an existing cache
    pub fn with_cache(provider: Arc<dyn MetadataProvider>, cache: InfoCache, timeout: Duration) -> Self {
        Self {
            provider,
            cache,
            timeout,
        }
    }

    /// The cache fetch results are written to
    pub fn cache(&self) -> &InfoCache {
        &self.cache
    }

    /// Start fetching metadata for `identity`
    ///
    /// Does nothing and returns `None` when the user has not consented to
    /// contacting the provider. Otherwise exactly one background task is
    /// spawned; its [`InfoUpdate`] is the single completion of the fetch.
    pub fn start(
        &self,
        identity: &AppIdentity,
        consent_granted: bool,
        cancel: CancellationToken,
    ) -> Option<TaskHandle<InfoUpdate>> {
        if !consent_granted {
            debug!(package = %identity.package_name(), "no consent to contact metadata provider, skipping fetch");
            return None;
        }

        let package_name = identity.package_name().to_string();
        let generation = self.cache.begin(&package_name);
        info!(package = %package_name, generation = generation.get(), "starting metadata fetch");

        let provider = Arc::clone(&self.provider);
        let cache = self.cache.clone();
        let timeout = self.timeout;
        let task_cancel = cancel.clone();

        Some(spawn_task(cancel, async move {
            let result = tokio::select! {
                _ = task_cancel.cancelled() => Err(Error::Metadata(MetadataError::Cancelled)),
                fetched = tokio::time::timeout(timeout, provider.fetch(&package_name)) => {
                    fetched.unwrap_or(Err(Error::Metadata(MetadataError::Timeout(timeout))))
                }
            };

            let status = match result {
                Ok(info) => {
                    let info = Arc::new(info);
                    if cache.store(&package_name, generation, Arc::clone(&info)) {
                        debug!(package = %package_name, generation = generation.get(), "metadata stored");
                    } else {
                        debug!(
                            package = %package_name,
                            generation = generation.get(),
                            "discarding metadata from superseded fetch"
                        );
                    }
                    InfoStatus::Available(info)
                }
                Err(e) => {
                    warn!(
                        package = %package_name,
                        generation = generation.get(),
                        error = %e,
                        "metadata fetch failed"
                    );
                    InfoStatus::Unavailable {
                        reason: e.to_string(),
                    }
                }
            };

            InfoUpdate {
                package_name,
                generation,
                status,
            }
        }))
    }
}
