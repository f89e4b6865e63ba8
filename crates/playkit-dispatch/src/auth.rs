//! Authentication status seam.
//!
//! The session state machine lives outside this subsystem; the worker
//! only reads a status value through this trait and decides whether a
//! category may be attempted. On status changes the owner should call
//! `DispatchWorker::signal()` so deferred requests are re-examined.

use playkit_core::{AuthStatus, ServiceCategory};
use std::sync::atomic::{AtomicI32, Ordering};

/// Read-only view of the current authentication status.
pub trait AuthStatusProvider: Send + Sync {
    /// Current status.
    fn status(&self) -> AuthStatus;

    /// Whether requests of `category` may be attempted right now.
    fn is_deliverable(&self, category: ServiceCategory) -> bool {
        self.status().admits(category)
    }
}

/// Lock-free shared status cell, the standard provider implementation.
/// The session state machine writes it; the worker reads it.
#[derive(Debug)]
pub struct SharedAuthStatus {
    code: AtomicI32,
}

impl SharedAuthStatus {
    pub fn new(status: AuthStatus) -> Self {
        Self {
            code: AtomicI32::new(status.code()),
        }
    }

    /// Publish a new status.
    pub fn set(&self, status: AuthStatus) {
        self.code.store(status.code(), Ordering::SeqCst);
    }
}

impl Default for SharedAuthStatus {
    fn default() -> Self {
        Self::new(AuthStatus::Undetermined)
    }
}

impl AuthStatusProvider for SharedAuthStatus {
    fn status(&self) -> AuthStatus {
        AuthStatus::from_code(self.code.load(Ordering::SeqCst))
            .unwrap_or(AuthStatus::Undetermined)
    }
}
