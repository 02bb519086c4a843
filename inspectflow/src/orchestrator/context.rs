//! State shared between the run and its external triggers.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::cancellation::CancellationToken;

/// Label updates received during a run.
#[derive(Debug, Default)]
pub struct LabelState {
    inner: Mutex<LabelInner>,
}

#[derive(Debug, Default)]
struct LabelInner {
    value: Option<String>,
    count: u64,
}

impl LabelState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one label update: keeps the value and counts the message.
    pub fn record(&self, value: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.value = Some(value.into());
        inner.count += 1;
    }

    /// The last value received.
    #[must_use]
    pub fn value(&self) -> Option<String> {
        self.inner.lock().value.clone()
    }

    /// Number of updates received.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.inner.lock().count
    }

    /// Value and count, read together.
    #[must_use]
    pub fn snapshot(&self) -> (Option<String>, u64) {
        let inner = self.inner.lock();
        (inner.value.clone(), inner.count)
    }

    /// Clears the value and the count.
    pub fn reset(&self) {
        *self.inner.lock() = LabelInner::default();
    }
}

/// Handles the orchestrator reads once per frame and that bus listeners
/// write from their own tasks.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Set by the cancellation-signal listener.
    pub cancel: Arc<CancellationToken>,
    /// Fed by the label-values listener.
    pub labels: Arc<LabelState>,
}

impl RunContext {
    /// Creates a fresh context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears both handles for a new run.
    pub fn reset(&self) {
        self.cancel.reset();
        self.labels.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_state_counts_messages() {
        let labels = LabelState::new();
        labels.record("L-001");
        labels.record("L-002");
        assert_eq!(labels.snapshot(), (Some("L-002".to_string()), 2));
        labels.reset();
        assert_eq!(labels.value(), None);
        assert_eq!(labels.count(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let ctx = RunContext::new();
        let listener = ctx.clone();
        listener.cancel.cancel("operator");
        listener.labels.record("L-9");
        assert!(ctx.cancel.is_cancelled());
        assert_eq!(ctx.labels.count(), 1);

        ctx.reset();
        assert!(!listener.cancel.is_cancelled());
        assert_eq!(listener.labels.count(), 0);
    }
}
