//! Four-phase load/unload cycle.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use super::{detect_or_miss, StageTracker, StepLog, StepRecord};
use crate::catalog::{LoadUnloadParams, StageDefinition};
use crate::core::GateVerdict;
use crate::events::StepPublisher;
use crate::gate::{ceiling_exceeded, StageGate};
use crate::vision::{AnnotatedFrame, DetectionFilter, Detector, Frame};

/// Phase of a load/unload cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Waiting for the first load to be present.
    WaitLoad1,
    /// Waiting for the first load to be removed.
    WaitUnload1,
    /// Waiting for the second load to be present.
    WaitLoad2,
    /// Waiting for the second load to be removed.
    WaitUnload2,
}

impl CyclePhase {
    fn next(self) -> Option<Self> {
        match self {
            Self::WaitLoad1 => Some(Self::WaitUnload1),
            Self::WaitUnload1 => Some(Self::WaitLoad2),
            Self::WaitLoad2 => Some(Self::WaitUnload2),
            Self::WaitUnload2 => None,
        }
    }

    fn is_load(self) -> bool {
        matches!(self, Self::WaitLoad1 | Self::WaitLoad2)
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitLoad1 => write!(f, "wait_load_1"),
            Self::WaitUnload1 => write!(f, "wait_unload_1"),
            Self::WaitLoad2 => write!(f, "wait_load_2"),
            Self::WaitUnload2 => write!(f, "wait_unload_2"),
        }
    }
}

/// Requires two full load/unload cycles in a region.
///
/// Each phase has its own gate without a timeout, so an interruption resets
/// only the phase in progress. The overall ceiling fails the stage from any
/// phase. One step event is published for the whole cycle.
pub struct LoadUnloadTracker {
    definition: Arc<StageDefinition>,
    filter: DetectionFilter,
    load_seconds: f64,
    unload_seconds: f64,
    ceiling_seconds: f64,
    started_at: Option<f64>,
    phase: CyclePhase,
    gate: StageGate,
    active: bool,
    outcome: Option<bool>,
    log: StepLog,
}

impl LoadUnloadTracker {
    /// Creates a tracker with an already-resolved filter.
    #[must_use]
    pub fn new(
        definition: Arc<StageDefinition>,
        params: &LoadUnloadParams,
        filter: DetectionFilter,
        publisher: StepPublisher,
    ) -> Self {
        Self {
            log: StepLog::new(definition.name.clone(), publisher),
            definition,
            filter,
            load_seconds: params.load_seconds,
            unload_seconds: params.unload_seconds,
            ceiling_seconds: params.ceiling_seconds,
            started_at: None,
            phase: CyclePhase::WaitLoad1,
            gate: StageGate::without_timeout(params.load_seconds),
            active: true,
            outcome: None,
        }
    }

    /// The phase in progress.
    #[must_use]
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    fn advance(&mut self, now: f64) {
        match self.phase.next() {
            Some(next) => {
                info!(stage = %self.definition.name, from = %self.phase, to = %next, "Cycle phase complete");
                self.phase = next;
                let required = if next.is_load() {
                    self.load_seconds
                } else {
                    self.unload_seconds
                };
                self.gate = StageGate::without_timeout(required);
                self.gate.arm(now);
            }
            None => self.finish(true),
        }
    }

    fn finish(&mut self, passed: bool) {
        let def = &self.definition;
        if passed {
            self.log.pass(&def.name, &def.description);
        } else {
            warn!(stage = %def.name, phase = %self.phase, "Cycle ceiling exceeded");
            self.log.fail(&def.name, &def.description, &def.alert_message);
        }
        self.outcome = Some(passed);
        self.active = false;
    }
}

impl StageTracker for LoadUnloadTracker {
    fn stage(&self) -> &str {
        &self.definition.name
    }

    fn process(&mut self, frame: &Frame, detector: &mut dyn Detector) -> AnnotatedFrame {
        let mut annotated = AnnotatedFrame::bare(frame.clone());
        if !self.active {
            return annotated;
        }
        let now = frame.captured_at;
        let started_at = *self.started_at.get_or_insert(now);
        if ceiling_exceeded(started_at, now, self.ceiling_seconds) {
            self.finish(false);
            return annotated;
        }

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

        let verdict = if self.phase.is_load() {
            self.gate.observe(now, present)
        } else {
            self.gate.observe_absence(now, present)
        };
        if verdict == GateVerdict::Satisfied {
            self.advance(now);
        }
        annotated.text(format!("{}: {}", self.definition.name, self.phase));
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
