//! Debounce/timeout primitive over a boolean per-frame signal.
//!
//! A gate decides, frame by frame, whether a signal has been continuously
//! true for `required_continuous_seconds`, or whether `timeout_seconds`
//! elapsed without that happening. Continuity rather than a cumulative count
//! is what rejects single-frame flicker.
//!
//! Both thresholds carry one second of slack (`required - 1`,
//! `timeout - 1`) to tolerate frame-timing jitter.

use std::collections::VecDeque;

use crate::core::{GateState, GateVerdict};

/// Slack applied to both thresholds, in seconds.
pub const JITTER_SLACK_SECONDS: f64 = 1.0;

/// Sliding-window debounce gate.
///
/// Times are the frames' monotonic capture seconds.
#[derive(Debug, Clone)]
pub struct StageGate {
    required: f64,
    timeout: Option<f64>,
    armed_at: Option<f64>,
    observations: VecDeque<f64>,
    state: GateState,
}

impl StageGate {
    /// Creates a gate with a timeout.
    #[must_use]
    pub fn new(required_continuous_seconds: f64, timeout_seconds: f64) -> Self {
        Self {
            required: required_continuous_seconds,
            timeout: Some(timeout_seconds),
            armed_at: None,
            observations: VecDeque::new(),
            state: GateState::Armed,
        }
    }

    /// Creates a gate that never times out on its own.
    ///
    /// Used by phases whose deadline is enforced by an outer ceiling.
    #[must_use]
    pub fn without_timeout(required_continuous_seconds: f64) -> Self {
        Self {
            timeout: None,
            ..Self::new(required_continuous_seconds, 0.0)
        }
    }

    /// Records the arming time. Later calls are no-ops.
    pub fn arm(&mut self, now: f64) {
        if self.armed_at.is_none() {
            self.armed_at = Some(now);
        }
    }

    /// Feeds one observation of the signal.
    ///
    /// A true signal extends the window; a false one breaks continuity and
    /// is the only point at which the timeout is checked. Once terminal the
    /// gate keeps reporting its terminal verdict.
    pub fn observe(&mut self, now: f64, signal: bool) -> GateVerdict {
        if self.state.is_terminal() {
            return self.state.verdict();
        }
        self.arm(now);
        self.state = GateState::Waiting;

        if signal {
            self.observations.push_back(now);
            self.prune(now);
            if self.window_span() >= self.required - JITTER_SLACK_SECONDS {
                self.state = GateState::Satisfied;
            }
        } else {
            self.observations.clear();
            if self.timeout_elapsed(now) {
                self.state = GateState::TimedOut;
            }
        }

        self.state.verdict()
    }

    /// Feeds one observation for a "continuously absent" criterion.
    pub fn observe_absence(&mut self, now: f64, present: bool) -> GateVerdict {
        self.observe(now, !present)
    }

    /// Forces the gate to satisfied, e.g. on operator override.
    ///
    /// Returns false when the gate was already terminal.
    pub fn force_satisfy(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = GateState::Satisfied;
        true
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> GateState {
        self.state
    }

    /// When the gate was armed, if it has been.
    #[must_use]
    pub fn armed_at(&self) -> Option<f64> {
        self.armed_at
    }

    /// Seconds elapsed since arming.
    #[must_use]
    pub fn elapsed(&self, now: f64) -> f64 {
        self.armed_at.map_or(0.0, |armed| now - armed)
    }

    /// Span of the retained window in seconds.
    #[must_use]
    pub fn window_span(&self) -> f64 {
        match (self.observations.front(), self.observations.back()) {
            (Some(first), Some(last)) => last - first,
            _ => f64::NEG_INFINITY,
        }
    }

    /// Number of retained observations.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.observations.len()
    }

    /// Required continuous seconds.
    #[must_use]
    pub fn required_seconds(&self) -> f64 {
        self.required
    }

    fn prune(&mut self, now: f64) {
        while let Some(&oldest) = self.observations.front() {
            if now - oldest > self.required {
                self.observations.pop_front();
            } else {
                break;
            }
        }
    }

    fn timeout_elapsed(&self, now: f64) -> bool {
        match self.timeout {
            Some(timeout) => self.elapsed(now) > timeout - JITTER_SLACK_SECONDS,
            None => false,
        }
    }
}

/// Checks an elapsed-time ceiling with the same slack gates use.
#[must_use]
pub fn ceiling_exceeded(started_at: f64, now: f64, ceiling_seconds: f64) -> bool {
    now - started_at > ceiling_seconds - JITTER_SLACK_SECONDS
}
