//! Cancellation flag shared between the bus listener and the orchestrator.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

type Listener = Box<dyn Fn() + Send + Sync>;

/// A flag requesting cancellation of the active run.
///
/// Only the first reason is kept. Listeners registered with
/// [`CancellationToken::on_cancel`] fire once per request.
#[derive(Default)]
pub struct CancellationToken {
    requested: AtomicBool,
    reason: RwLock<Option<String>>,
    listeners: RwLock<Vec<Listener>>,
}

impl CancellationToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    ///
    /// Returns false when cancellation was already requested.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        if self
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        *self.reason.write() = Some(reason.into());
        for listener in self.listeners.read().iter() {
            notify(listener);
        }
        true
    }

    /// Registers a listener; it fires immediately if cancellation is
    /// already pending.
    pub fn on_cancel<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_cancelled() {
            notify(&listener);
        }
        self.listeners.write().push(Box::new(listener));
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// The first reason given, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Clears a pending request. Listeners stay registered.
    ///
    /// Called when a new run starts so a stale request does not end it.
    pub fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
        *self.reason.write() = None;
    }
}

fn notify(listener: &(dyn Fn() + Send + Sync)) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(listener)) {
        warn!("Cancellation listener panicked: {:?}", e);
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("requested", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        assert!(token.cancel("operator"));
        assert!(!token.cancel("supervisor"));
        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("operator"));
    }

    #[test]
    fn test_listener_fires_once_per_request() {
        let token = CancellationToken::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel("a");
        token.cancel("b");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        token.reset();
        assert!(!token.is_cancelled());
        token.cancel("c");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_late_listener_fires_immediately() {
        let token = CancellationToken::new();
        token.cancel("early");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        token.on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_is_contained() {
        let token = CancellationToken::new();
        token.on_cancel(|| panic!("listener failure"));
        assert!(token.cancel("test"));
        assert!(token.is_cancelled());
    }
}
