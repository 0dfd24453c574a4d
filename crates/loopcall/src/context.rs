//! Cancellation-carrier value passed as the first parameter of every service
//! method.
//!
//! Cancellation is strictly cooperative: the dispatcher and the loopback
//! transport never observe it. A handler that ignores its context can block
//! its call for as long as it likes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Per-call context handed to every handler.
///
/// Cheap to clone; all clones observe the same cancellation state.
#[derive(Clone, Debug, Default)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Debug, Default)]
struct ContextInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Context {
    /// Create a fresh, never-cancelled context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the context as cancelled and wake every task waiting on
    /// [`Context::cancelled`].
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Whether the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once the context is cancelled.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            // Register interest before re-checking so a cancel between the
            // check and the await is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
