//! Cooperative cancellation for in-flight runs (§5, §8 scenario S4).
//!
//! Thin wrapper over `tokio_util::sync::CancellationToken` so the engine and
//! its callers share one vocabulary (`cancel`/`is_cancelled`/`cancelled`)
//! without reaching into `tokio_util` directly at every call site.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct CancellationHandle(CancellationToken);

impl CancellationHandle {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    /// Requests cancellation. Idempotent: cancelling twice is a no-op.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once `cancel` has been called. Safe to race against other
    /// futures in a `tokio::select!`.
    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }

    /// A child token cancelled when either it or its parent is cancelled,
    /// but whose own cancellation does not propagate back up. Used to scope
    /// cancellation to a single in-flight tool call or backend request.
    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }
}
