//! Single-gate stages: arrival, garment, wrap, label, unload, finish.

use std::sync::Arc;
use tracing::{debug, info};

use super::{detect_or_miss, StageTracker, StepLog, StepRecord};
use crate::catalog::StageDefinition;
use crate::core::GateVerdict;
use crate::events::StepPublisher;
use crate::gate::{StageGate, JITTER_SLACK_SECONDS};
use crate::vision::{AnnotatedFrame, DetectionFilter, Detector, Frame};

/// What the gate signal means for a single-phase stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Matching detections continuously present.
    Presence,
    /// Matching detections continuously absent; times out while they remain.
    Absence,
    /// A first detection within the timeout, then continuous absence with
    /// no further deadline.
    Departure,
}

/// A stage decided by one gate.
pub struct SinglePhaseTracker {
    definition: Arc<StageDefinition>,
    criterion: Criterion,
    filter: DetectionFilter,
    gate: StageGate,
    required_seconds: f64,
    departure_gate: Option<StageGate>,
    exempt: bool,
    active: bool,
    outcome: Option<bool>,
    log: StepLog,
}

impl SinglePhaseTracker {
    /// Creates a tracker with an already-resolved filter.
    #[must_use]
    pub fn new(
        definition: Arc<StageDefinition>,
        criterion: Criterion,
        filter: DetectionFilter,
        required_seconds: f64,
        timeout_seconds: f64,
        publisher: StepPublisher,
    ) -> Self {
        // Departure first waits for any single detection.
        let gate = match criterion {
            Criterion::Departure => StageGate::new(JITTER_SLACK_SECONDS, timeout_seconds),
            Criterion::Presence | Criterion::Absence => StageGate::new(required_seconds, timeout_seconds),
        };
        Self {
            log: StepLog::new(definition.name.clone(), publisher),
            definition,
            criterion,
            filter,
            gate,
            required_seconds,
            departure_gate: None,
            exempt: false,
            active: true,
            outcome: None,
        }
    }

    /// Marks the stage exempt: it deactivates on its first frame with no
    /// outcome and publishes nothing.
    #[must_use]
    pub fn exempt(mut self) -> Self {
        self.exempt = true;
        self
    }

    /// The criterion being evaluated.
    #[must_use]
    pub fn criterion(&self) -> Criterion {
        self.criterion
    }

    fn observe(&mut self, now: f64, present: bool) -> GateVerdict {
        match self.criterion {
            Criterion::Presence => self.gate.observe(now, present),
            Criterion::Absence => self.gate.observe_absence(now, present),
            Criterion::Departure => {
                if let Some(gate) = self.departure_gate.as_mut() {
                    return gate.observe_absence(now, present);
                }
                let verdict = self.gate.observe(now, present);
                if verdict == GateVerdict::Satisfied {
                    debug!(stage = %self.definition.name, at = now, "Initial detection seen; waiting for departure");
                    let mut gate = StageGate::without_timeout(self.required_seconds);
                    gate.arm(now);
                    self.departure_gate = Some(gate);
                    return GateVerdict::Pending;
                }
                verdict
            }
        }
    }

    fn finish(&mut self, passed: bool) {
        let def = &self.definition;
        if passed {
            self.log.pass(&def.name, &def.description);
        } else {
            self.log.fail(&def.name, &def.description, &def.alert_message);
        }
        self.outcome = Some(passed);
        self.active = false;
    }

    fn status_text(&self) -> String {
        match (self.criterion, self.departure_gate.is_some()) {
            (Criterion::Departure, true) => format!("{}: waiting for departure", self.definition.name),
            _ => format!("{}: {}", self.definition.name, self.gate.state()),
        }
    }
}

impl StageTracker for SinglePhaseTracker {
    fn stage(&self) -> &str {
        &self.definition.name
    }

    fn process(&mut self, frame: &Frame, detector: &mut dyn Detector) -> AnnotatedFrame {
        let mut annotated = AnnotatedFrame::bare(frame.clone());
        if !self.active {
            return annotated;
        }
        if self.exempt {
            info!(stage = %self.definition.name, "Stage exempt for this procedure");
            self.active = false;
            return annotated;
        }

        let now = frame.captured_at;
        self.gate.arm(now);
        if let Some(roi) = self.filter.roi {
            annotated.region(&self.definition.name, roi);
        }

        let Some(detections) = detect_or_miss(&self.definition.name, detector, frame) else {
            return annotated;
        };
        let mut present = false;
        for det in self.filter.matching(&detections) {
            annotated.detection(&det.label, det.confidence, det.bbox);
            present = true;
        }

        match self.observe(now, present) {
            GateVerdict::Satisfied => self.finish(true),
            GateVerdict::TimedOut => self.finish(false),
            GateVerdict::Pending => {}
        }
        annotated.text(self.status_text());
        annotated
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn outcome(&self) -> Option<bool> {
        self.outcome
    }

    fn skip(&mut self, justification: &str) {
        if !self.active {
            return;
        }
        self.gate.force_satisfy();
        let def = &self.definition;
        self.log.skip(&def.name, &def.description, justification);
        self.outcome = Some(true);
        self.active = false;
    }

    fn abort(&mut self) {
        self.active = false;
    }

    fn steps(&self) -> &[StepRecord] {
        self.log.records()
    }
}
