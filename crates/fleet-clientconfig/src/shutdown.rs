//! Process-wide restart request
//!
//! Drift is never repaired in place. The controller requests a shutdown, the
//! binary's run loop observes the token and exits cleanly, and the supervisor
//! starts a fresh process that bootstraps again.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Idempotent shutdown request shared by every reconcile worker
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    token: CancellationToken,
    reason: OnceLock<String>,
}

impl ShutdownSignal {
    /// Create an untriggered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown
    ///
    /// Returns `true` only for the call that fired the signal. Later calls
    /// are no-ops and keep the first reason.
    pub fn request(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        match self.inner.reason.set(reason) {
            Ok(()) => {
                info!(
                    reason = %self.reason().unwrap_or_default(),
                    "Shutdown requested, process will exit for a clean bootstrap"
                );
                self.inner.token.cancel();
                true
            }
            Err(ignored) => {
                debug!(reason = %ignored, "Shutdown already requested");
                false
            }
        }
    }

    /// True once shutdown has been requested
    pub fn is_requested(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Reason passed to the first [`request`](Self::request)
    pub fn reason(&self) -> Option<&str> {
        self.inner.reason.get().map(String::as_str)
    }

    /// Token cancelled when shutdown is requested
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Wait until shutdown is requested
    pub async fn requested(&self) {
        self.inner.token.cancelled().await
    }
}
