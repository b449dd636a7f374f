//! Filesystem capability gating for the export.
//!
//! [`PermissionGate::ensure_granted`] never blocks: when the capability is
//! missing it asks the [`CapabilityGate`] and hands back a [`CorrelationToken`].
//! The OS answer arrives later through the screen's message loop carrying the
//! same token, which [`PermissionGate::resolve`] matches to the pending request.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// OS-granted permissions the core may need
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Write access to shared external storage
    WriteExternalStorage,
}

/// Correlates an asynchronous capability request with its grant/deny callback
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationToken {
    /// Fixed request code identifying the gated operation (resume export)
    pub request_code: u32,
    /// Distinguishes successive requests with the same code
    pub sequence: u64,
}

impl std::fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.request_code, self.sequence)
    }
}

/// OS-level permission check and request mechanism
pub trait CapabilityGate: Send + Sync {
    /// Whether the capability is currently held
    fn is_granted(&self, capability: Capability) -> bool;

    /// Ask the user/OS for the capability
    ///
    /// Must not block. The answer is delivered later by the host through
    /// [`ScreenHandle::permission_result`](crate::screen::ScreenHandle::permission_result)
    /// with the same token.
    fn request(&self, capability: Capability, token: CorrelationToken);
}

/// Gate with a fixed answer, for hosts without a runtime permission model
///
/// Requests are only counted; hosts deliver the answer themselves.
#[derive(Debug, Default)]
pub struct StaticCapabilityGate {
    granted: AtomicBool,
    requests: Mutex<Vec<CorrelationToken>>,
}

impl StaticCapabilityGate {
    /// Gate that reports the capability as held
    pub fn granted() -> Self {
        Self {
            granted: AtomicBool::new(true),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Gate that reports the capability as missing
    pub fn denied() -> Self {
        Self::default()
    }

    /// Change the reported state, e.g. after the host granted a request
    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    /// Tokens of every request issued so far
    pub fn requests(&self) -> Vec<CorrelationToken> {
        self.lock_requests().clone()
    }

    fn lock_requests(&self) -> MutexGuard<'_, Vec<CorrelationToken>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CapabilityGate for StaticCapabilityGate {
    fn is_granted(&self, _capability: Capability) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request(&self, _capability: Capability, token: CorrelationToken) {
        self.lock_requests().push(token);
    }
}

/// Result of [`PermissionGate::ensure_granted`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// The capability is held; proceed
    Granted,
    /// A request was issued; wait for the callback carrying this token
    Pending(CorrelationToken),
}

impl Access {
    /// Whether the gated operation may run now
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted)
    }
}

/// Checks the write capability before an export may start
pub struct PermissionGate {
    gate: std::sync::Arc<dyn CapabilityGate>,
    capability: Capability,
    request_code: u32,
    sequence: AtomicU64,
    pending: Mutex<Option<CorrelationToken>>,
}

impl PermissionGate {
    /// Create a gate for the export capability using `request_code` for correlation
    pub fn new(gate: std::sync::Arc<dyn CapabilityGate>, request_code: u32) -> Self {
        Self {
            gate,
            capability: Capability::WriteExternalStorage,
            request_code,
            sequence: AtomicU64::new(0),
            pending: Mutex::new(None),
        }
    }

    /// Return `Granted` if the capability is held, otherwise request it
    ///
    /// A new request supersedes any still-pending one; only the newest token
    /// resolves.
    pub fn ensure_granted(&self) -> Access {
        if self.gate.is_granted(self.capability) {
            // An outstanding request is settled; its late answer resolves nothing
            if let Some(token) = self.lock_pending().take() {
                tracing::debug!(%token, "capability already held, dropping pending request");
            }
            return Access::Granted;
        }

        let token = CorrelationToken {
            request_code: self.request_code,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
        };
        *self.lock_pending() = Some(token);
        tracing::info!(%token, capability = ?self.capability, "requesting capability");
        self.gate.request(self.capability, token);
        Access::Pending(token)
    }

    /// Match a grant/deny callback to the outstanding request
    ///
    /// Returns `Some(granted)` when `token` is the pending request (which is
    /// then cleared) and `None` for unknown or superseded tokens.
    pub fn resolve(&self, token: CorrelationToken, granted: bool) -> Option<bool> {
        let mut pending = self.lock_pending();
        if *pending != Some(token) {
            tracing::debug!(%token, "ignoring capability callback for unknown request");
            return None;
        }
        *pending = None;
        tracing::info!(%token, granted, "capability request answered");
        Some(granted)
    }

    /// Token of the request still waiting for an answer
    pub fn pending(&self) -> Option<CorrelationToken> {
        *self.lock_pending()
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<CorrelationToken>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
