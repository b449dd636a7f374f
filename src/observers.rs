//! Observer registry for "app info loaded" notifications
//!
//! Observers register once and receive a [`Subscription`] handle; dropping the
//! handle unregisters them. Notification happens on the controlling context only,
//! after the metadata cache has been written.
//!
//! ```
//! use app_details_core::observers::{Observer, ObserverRegistry};
//! use app_details_core::{InfoUpdate, Result};
//! use std::sync::Arc;
//!
//! struct Header;
//!
//! impl Observer for Header {
//!     fn on_app_info_loaded(&self, update: &InfoUpdate) -> Result<()> {
//!         println!("loaded {} (available: {})", update.package_name, update.status.is_available());
//!         Ok(())
//!     }
//! }
//!
//! let registry = ObserverRegistry::new();
//! let subscription = registry.register(Arc::new(Header));
//! assert_eq!(registry.len(), 1);
//! drop(subscription);
//! assert!(registry.is_empty());
//! ```

use crate::error::Result;
use crate::types::InfoUpdate;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Something interested in metadata arriving for the screen's app
pub trait Observer: Send + Sync {
    /// Called on the controlling context once a fetch has completed
    ///
    /// An `Err` is logged and does not stop other observers from being notified.
    fn on_app_info_loaded(&self, update: &InfoUpdate) -> Result<()>;
}

type ObserverId = u64;

struct Entry {
    id: ObserverId,
    observer: Arc<dyn Observer>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    next_id: ObserverId,
}

/// Set of observers for one screen (cloneable - shares the same set)
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl ObserverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    /// Register an observer
    ///
    /// Registering the same `Arc` twice keeps a single entry; the returned
    /// handles then refer to that entry and disposing either removes it.
    pub fn register(&self, observer: Arc<dyn Observer>) -> Subscription {
        let mut inner = self.lock();

        if let Some(existing) = inner
            .entries
            .iter()
            .find(|entry| same_observer(&entry.observer, &observer))
        {
            return Subscription {
                id: existing.id,
                registry: Arc::downgrade(&self.inner),
            };
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push(Entry { id, observer });
        tracing::debug!(observer_id = id, "observer registered");

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Remove an observer by identity; no-op if it is not registered
    pub fn unregister(&self, observer: &Arc<dyn Observer>) {
        self.lock()
            .entries
            .retain(|entry| !same_observer(&entry.observer, observer));
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no observer is registered
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Notify every registered observer once
    ///
    /// Iterates a snapshot so observers may register or unregister from inside
    /// their callback. Each entry is re-checked before it is invoked, so an
    /// observer removed earlier in the same pass is skipped. Returns how many
    /// observers handled the update without error.
    pub fn notify_all(&self, update: &InfoUpdate) -> usize {
        let snapshot: Vec<(ObserverId, Arc<dyn Observer>)> = self
            .lock()
            .entries
            .iter()
            .map(|entry| (entry.id, Arc::clone(&entry.observer)))
            .collect();

        let mut delivered = 0;
        for (id, observer) in snapshot {
            let still_registered = self.lock().entries.iter().any(|entry| entry.id == id);
            if !still_registered {
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| observer.on_app_info_loaded(update))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(
                        observer_id = id,
                        package = %update.package_name,
                        error = %e,
                        "observer failed to handle app info update"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        observer_id = id,
                        package = %update.package_name,
                        "observer panicked while handling app info update"
                    );
                }
            }
        }

        tracing::debug!(
            package = %update.package_name,
            generation = update.generation.get(),
            delivered,
            "observers notified"
        );
        delivered
    }
}

// Compares data pointers only; vtable pointers for the same type may differ
// between codegen units.
fn same_observer(a: &Arc<dyn Observer>, b: &Arc<dyn Observer>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // Observers run outside the lock; a poisoned entry list is still valid.
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registration handle returned by [`ObserverRegistry::register`]
///
/// The observer stays registered for as long as the handle lives.
#[must_use = "dropping a Subscription unregisters the observer immediately"]
pub struct Subscription {
    id: ObserverId,
    registry: Weak<Mutex<Inner>>,
}

impl Subscription {
    /// Unregister now instead of at drop time
    pub fn cancel(self) {
        drop(self);
    }

    /// Whether the observer is still registered
    pub fn is_active(&self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let active = lock_inner(&inner).entries.iter().any(|e| e.id == self.id);
        active
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            lock_inner(&inner).entries.retain(|entry| entry.id != self.id);
            tracing::debug!(observer_id = self.id, "observer unregistered");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
