//! # app-details-core
//!
//! Asynchronous task-coordination core of an app-details screen in a
//! tracker-monitoring app.
//!
//! A [`DetailsScreen`] coordinates two independent background operations for
//! one app:
//! - a one-shot fetch of store listing metadata, cached per package and
//!   broadcast to registered [`observers`] once it completes, and
//! - a CSV export of the app's stored tracker records, gated on the
//!   filesystem-write capability and optionally handed to another process.
//!
//! ## Design Philosophy
//!
//! - **Single controlling context** - background tasks post their completion
//!   into the screen's message loop; only the loop touches screen state
//! - **Pluggable collaborators** - the record store, metadata provider,
//!   capability gate and handoff service are traits
//! - **Event-driven** - consumers subscribe to [`Event`]s, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use app_details_core::{
//!     AppIdentity, Config, Database, DetailsScreen, LocalHandoff, PlayStoreProvider,
//!     ScreenServices, StaticCapabilityGate, run_with_shutdown,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let db = Arc::new(Database::new(std::path::Path::new("details.db")).await?);
//!
//!     let services = ScreenServices {
//!         records: db.clone(),
//!         metadata: Arc::new(PlayStoreProvider::new(&config.metadata)?),
//!         capabilities: Arc::new(StaticCapabilityGate::granted()),
//!         handoff: Arc::new(LocalHandoff),
//!         preferences: db,
//!     };
//!     let identity = AppIdentity::new("com.example.app", 10123, "Example");
//!     let mut screen = DetailsScreen::new(identity, config, services)?;
//!
//!     // Subscribe to events
//!     let mut events = screen.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     screen.activate().await;
//!     screen.handle().request_export()?;
//!     run_with_shutdown(screen).await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// CSV export of stored records
pub mod export;
/// Store listing metadata lookup and cache
pub mod metadata;
/// "App info loaded" observer registry
pub mod observers;
/// Filesystem capability gating
pub mod permission;
/// Persisted user preferences
pub mod preferences;
/// The screen's controlling context
pub mod screen;
/// Handing exports to other processes
pub mod share;
/// Cancellable background tasks
pub mod tasks;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{DatabaseError, Error, ExportError, MetadataError, Result};
pub use export::{ExportJob, ExportState, MemoryRecordStore, RecordCursor, RecordStore};
pub use metadata::{InfoCache, InfoLoader, MetadataProvider, PlayStoreProvider};
pub use observers::{Observer, ObserverRegistry, Subscription};
pub use permission::{
    Access, Capability, CapabilityGate, CorrelationToken, PermissionGate, StaticCapabilityGate,
};
pub use preferences::{PreferenceStore, StaticPreferences};
pub use screen::{DetailsScreen, ScreenHandle, ScreenServices};
pub use share::{ContentReference, HandoffService, LocalHandoff, ShareHandoff, ShareIntent};
pub use tasks::{TaskHandle, spawn_task};
pub use types::{
    AppIdentity, AppInfo, Event, ExportOutcome, ExportRow, Generation, InfoStatus, InfoUpdate,
};

/// Helper function to run a screen's loop with graceful signal handling.
///
/// Processes messages until the screen is shut down through its
/// [`ScreenHandle`] or a termination signal arrives, in which case the screen
/// is torn down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(mut screen: DetailsScreen) {
    let interrupted = tokio::select! {
        _ = screen.run() => false,
        _ = wait_for_signal() => true,
    };

    if interrupted {
        screen.teardown();
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
