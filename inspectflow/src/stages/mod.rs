//! Stage trackers: per-frame processing units built from stage gates.
//!
//! A tracker is created when its stage's turn arrives and dropped when the
//! stage ends. It never owns a detector; the orchestrator lends the
//! resident one for each `process` call.

mod color_class;
mod factory;
mod load_cycle;
mod result;
mod single;

pub use color_class::ColorThenClassTracker;
pub use factory::TrackerFactory;
pub use load_cycle::{CyclePhase, LoadUnloadTracker};
pub use result::{StepRecord, StepStatus};
pub use single::{Criterion, SinglePhaseTracker};

use tracing::{info, warn};

use crate::events::StepPublisher;
use crate::vision::{AnnotatedFrame, Detection, Detector, Frame};

/// A per-frame processing unit for one stage.
///
/// Once inactive, `process` is a no-op: the outcome and the published
/// events never change again.
pub trait StageTracker: Send {
    /// Name of the stage this tracker runs.
    fn stage(&self) -> &str;

    /// Feeds one normalized frame.
    fn process(&mut self, frame: &Frame, detector: &mut dyn Detector) -> AnnotatedFrame;

    /// Whether the stage is still being evaluated.
    fn is_active(&self) -> bool;

    /// `Some(passed)` once decided; `None` while active or when exempt.
    fn outcome(&self) -> Option<bool>;

    /// Operator override: force-completes the active step with `skip=true`
    /// and deactivates the tracker.
    fn skip(&mut self, justification: &str);

    /// Deactivates without publishing anything (run cancelled).
    fn abort(&mut self);

    /// Records of the steps that reached a terminal state.
    fn steps(&self) -> &[StepRecord];

    /// Alert texts raised so far, in order.
    fn alerts(&self) -> Vec<&str> {
        self.steps().iter().filter_map(|s| s.alert.as_deref()).collect()
    }
}

/// Runs the detector, turning a failure into a missed observation.
pub(crate) fn detect_or_miss(stage: &str, detector: &mut dyn Detector, frame: &Frame) -> Option<Vec<Detection>> {
    match detector.detect(frame) {
        Ok(detections) => Some(detections),
        Err(e) => {
            warn!(stage, model = detector.model(), error = %e, "Detection failed; frame counted as missed");
            None
        }
    }
}

/// Publishes each step's terminal transition exactly once and keeps the
/// audit records.
#[derive(Debug)]
pub(crate) struct StepLog {
    stage: String,
    publisher: StepPublisher,
    records: Vec<StepRecord>,
}

impl StepLog {
    pub(crate) fn new(stage: impl Into<String>, publisher: StepPublisher) -> Self {
        Self {
            stage: stage.into(),
            publisher,
            records: Vec::new(),
        }
    }

    pub(crate) fn pass(&mut self, step: &str, description: &str) -> bool {
        self.record(step, description, StepStatus::Passed, None, None)
    }

    pub(crate) fn fail(&mut self, step: &str, description: &str, alert: &str) -> bool {
        self.record(step, description, StepStatus::Failed, None, Some(alert))
    }

    pub(crate) fn skip(&mut self, step: &str, description: &str, justification: &str) -> bool {
        self.record(step, description, StepStatus::Skipped, Some(justification), None)
    }

    pub(crate) fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Conjunction of every recorded step; `None` when nothing was recorded.
    pub(crate) fn all_passed(&self) -> Option<bool> {
        if self.records.is_empty() {
            None
        } else {
            Some(self.records.iter().all(StepRecord::passed))
        }
    }

    fn record(
        &mut self,
        step: &str,
        description: &str,
        status: StepStatus,
        justification: Option<&str>,
        alert: Option<&str>,
    ) -> bool {
        if self.records.iter().any(|r| r.step == step) {
            warn!(stage = %self.stage, step, "Step already reported; ignoring repeat");
            return false;
        }
        let record = StepRecord {
            stage: self.stage.clone(),
            step: step.to_string(),
            description: description.to_string(),
            status,
            justification: justification.map(str::to_string),
            alert: alert.map(str::to_string),
            timestamp: self.publisher.timestamp(),
        };
        self.publisher.step(&record.to_event());
        if let Some(message) = alert {
            warn!(stage = %self.stage, step, message, "Step timed out");
            self.publisher.alert(&self.stage, message);
        } else {
            info!(stage = %self.stage, step, status = %status, "Step finished");
        }
        self.records.push(record);
        true
    }
}
