//! Two-phase stage: dominant colour first, then class presence.

use std::sync::Arc;
use tracing::{debug, info};

use super::{detect_or_miss, StageTracker, StepLog, StepRecord};
use crate::catalog::{ColorThenClassParams, PhaseSpec, StageDefinition};
use crate::core::GateVerdict;
use crate::events::StepPublisher;
use crate::gate::StageGate;
use crate::vision::{AnnotatedFrame, Detector, Frame, Palette};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Color,
    Class,
    Done,
}

/// Checks the dominant colour of a region against the expected colour,
/// then the expected class inside a region. Each phase has its own gate
/// and reports its own step.
///
/// The class phase starts only after the colour phase ended, whether it
/// passed or timed out, and is left out entirely when the expected class
/// is the catalog's "no check" value.
pub struct ColorThenClassTracker {
    definition: Arc<StageDefinition>,
    params: ColorThenClassParams,
    palette: Arc<Palette>,
    expected_color: String,
    check_class: bool,
    phase: Phase,
    aborted: bool,
    color_gate: StageGate,
    class_gate: StageGate,
    log: StepLog,
}

impl ColorThenClassTracker {
    /// Creates a tracker. `params.class_filter` must already be resolved
    /// against the procedure's expectations.
    #[must_use]
    pub fn new(
        definition: Arc<StageDefinition>,
        params: ColorThenClassParams,
        palette: Arc<Palette>,
        expected_color: impl Into<String>,
        check_class: bool,
        publisher: StepPublisher,
    ) -> Self {
        let color_gate = gate_for(&params.color);
        let class_gate = gate_for(&params.class);
        Self {
            log: StepLog::new(definition.name.clone(), publisher),
            definition,
            params,
            palette,
            expected_color: expected_color.into(),
            check_class,
            phase: Phase::Color,
            aborted: false,
            color_gate,
            class_gate,
        }
    }

    /// Whether the class phase will run.
    #[must_use]
    pub fn checks_class(&self) -> bool {
        self.check_class
    }

    fn end_phase(&mut self, verdict: GateVerdict) {
        let spec = match self.phase {
            Phase::Color => &self.params.color,
            Phase::Class => &self.params.class,
            Phase::Done => return,
        };
        match verdict {
            GateVerdict::Satisfied => self.log.pass(&spec.step, &spec.description),
            GateVerdict::TimedOut => self.log.fail(&spec.step, &spec.description, &spec.alert_message),
            GateVerdict::Pending => return,
        };
        self.phase = match self.phase {
            Phase::Color if self.check_class => Phase::Class,
            _ => Phase::Done,
        };
        if self.phase == Phase::Class {
            info!(stage = %self.definition.name, "Colour phase ended; checking class");
        }
    }

    fn process_color(&mut self, frame: &Frame, annotated: &mut AnnotatedFrame) {
        let now = frame.captured_at;
        self.color_gate.arm(now);
        annotated.region(&self.params.color.step, self.params.color_roi);

        let Some(observed) = self.palette.dominant_color(frame, &self.params.color_roi) else {
            debug!(stage = %self.definition.name, "No colour reading; frame counted as missed");
            return;
        };
        annotated.text(format!("colour: {observed}"));
        let verdict = self.color_gate.observe(now, observed == self.expected_color);
        self.end_phase(verdict);
    }

    fn process_class(&mut self, frame: &Frame, detector: &mut dyn Detector, annotated: &mut AnnotatedFrame) {
        let now = frame.captured_at;
        self.class_gate.arm(now);
        if let Some(roi) = self.params.class_filter.roi {
            annotated.region(&self.params.class.step, roi);
        }

        let Some(detections) = detect_or_miss(&self.definition.name, detector, frame) else {
            return;
        };
        let mut present = false;
        for det in self.params.class_filter.matching(&detections) {
            annotated.detection(&det.label, det.confidence, det.bbox);
            present = true;
        }
        if !present {
            if let Some(fallback) = &self.params.class_color_fallback {
                present = self.palette.dominant_color(frame, &self.params.color_roi) == Some(fallback.as_str());
            }
        }
        let verdict = self.class_gate.observe(now, present);
        self.end_phase(verdict);
    }

    fn current_spec(&self) -> Option<&PhaseSpec> {
        match self.phase {
            Phase::Color => Some(&self.params.color),
            Phase::Class => Some(&self.params.class),
            Phase::Done => None,
        }
    }
}

fn gate_for(spec: &PhaseSpec) -> StageGate {
    StageGate::new(spec.required_continuous_seconds, spec.timeout_seconds)
}

impl StageTracker for ColorThenClassTracker {
    fn stage(&self) -> &str {
        &self.definition.name
    }

    fn process(&mut self, frame: &Frame, detector: &mut dyn Detector) -> AnnotatedFrame {
        let mut annotated = AnnotatedFrame::bare(frame.clone());
        match self.phase {
            Phase::Color => self.process_color(frame, &mut annotated),
            Phase::Class => self.process_class(frame, detector, &mut annotated),
            Phase::Done => {}
        }
        annotated
    }

    fn is_active(&self) -> bool {
        self.phase != Phase::Done
    }

    fn outcome(&self) -> Option<bool> {
        if self.is_active() || self.aborted {
            None
        } else {
            self.log.all_passed()
        }
    }

    fn skip(&mut self, justification: &str) {
        let Some(spec) = self.current_spec() else {
            return;
        };
        let (step, description) = (spec.step.clone(), spec.description.clone());
        match self.phase {
            Phase::Color => self.color_gate.force_satisfy(),
            _ => self.class_gate.force_satisfy(),
        };
        self.log.skip(&step, &description, justification);
        self.phase = Phase::Done;
    }

    fn abort(&mut self) {
        if self.phase != Phase::Done {
            self.aborted = true;
            self.phase = Phase::Done;
        }
    }

    fn steps(&self) -> &[StepRecord] {
        self.log.records()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StageKind;
    use crate::core::{ALERTS_TOPIC, STEP_RESULTS_TOPIC};
    use crate::events::CollectingEventSink;
    use crate::testing::{detection_in, ScriptedDetector};
    use crate::utils::ManualClock;
    use crate::vision::{Containment, DetectionFilter, LabelRule, Roi, DEFAULT_FRAME_SIDE};

    const COLOR_ROI: Roi = Roi::new(225, 205, 120, 246);
    const CLASS_ROI: Roi = Roi::new(190, 170, 188, 319);
    const BLUE: [u8; 3] = [250, 5, 5];
    const GREY: [u8; 3] = [150, 150, 150];
    const COVERED: [u8; 3] = [20, 220, 230];

    fn palette() -> Arc<Palette> {
        Arc::new(
            Palette::new()
                .with_color("blue", [255, 0, 0])
                .with_color("empty", [146, 155, 153])
                .with_color("covered", [20, 220, 230]),
        )
    }

    fn params(fallback: Option<&str>) -> ColorThenClassParams {
        let phase = |step: &str, alert: &str| PhaseSpec {
            step: step.into(),
            description: format!("{step} check"),
            required_continuous_seconds: 2.0,
            timeout_seconds: 6.0,
            alert_message: alert.into(),
        };
        ColorThenClassParams {
            color_roi: COLOR_ROI,
            expected_color_key: "pallet_color".into(),
            color: phase("pallet_color", "Wrong pallet colour"),
            class_filter: DetectionFilter::new()
                .with_roi(CLASS_ROI, Containment::Box)
                .with_labels(LabelRule::OneOf(vec!["pbr".into()])),
            class: phase("pallet_class", "Wrong pallet class"),
            no_check_class: Some("none".into()),
            class_color_fallback: fallback.map(str::to_string),
        }
    }

    fn tracker(check_class: bool, fallback: Option<&str>) -> (ColorThenClassTracker, Arc<CollectingEventSink>) {
        let sink = Arc::new(CollectingEventSink::new());
        let publisher = StepPublisher::new(sink.clone(), Arc::new(ManualClock::default()));
        let p = params(fallback);
        let def = Arc::new(StageDefinition {
            name: "pallet".into(),
            description: "Pallet check".into(),
            source: "dock".into(),
            detector_model: "pallets".into(),
            alert_message: String::new(),
            kind: StageKind::ColorThenClass(p.clone()),
        });
        (ColorThenClassTracker::new(def, p, palette(), "blue", check_class, publisher), sink)
    }

    fn feed(tracker: &mut ColorThenClassTracker, detector: &mut ScriptedDetector, from: f64, to: f64, bgr: [u8; 3]) {
        let mut t = from;
        while t <= to + 1e-9 && tracker.is_active() {
            tracker.process(&Frame::solid("dock", t, DEFAULT_FRAME_SIDE, bgr), detector);
            t += 0.5;
        }
    }

    #[test]
    fn test_both_phases_pass_with_two_step_events() {
        let (mut tracker, sink) = tracker(true, None);
        let mut detector = ScriptedDetector::new("pallets").repeating(vec![detection_in(&CLASS_ROI, "pbr", 0.9)]);

        feed(&mut tracker, &mut detector, 0.0, 1.0, BLUE);
        assert!(tracker.is_active());
        assert_eq!(tracker.steps().len(), 1);
        assert_eq!(detector.calls(), 0);

        feed(&mut tracker, &mut detector, 1.5, 5.0, BLUE);
        assert_eq!(tracker.outcome(), Some(true));
        let steps: Vec<_> = sink.on_topic(STEP_RESULTS_TOPIC).iter().map(|e| e["step"].clone()).collect();
        assert_eq!(steps, vec!["pallet_color", "pallet_class"]);
    }

    #[test]
    fn test_colour_timeout_still_checks_class() {
        let (mut tracker, sink) = tracker(true, None);
        let mut detector = ScriptedDetector::new("pallets").repeating(vec![detection_in(&CLASS_ROI, "pbr", 0.9)]);

        feed(&mut tracker, &mut detector, 0.0, 5.5, GREY);
        assert_eq!(tracker.steps()[0].status, crate::stages::StepStatus::Failed);
        assert!(tracker.is_active());

        feed(&mut tracker, &mut detector, 6.0, 10.0, GREY);
        assert_eq!(tracker.outcome(), Some(false));
        assert_eq!(sink.count(STEP_RESULTS_TOPIC), 2);
        assert_eq!(sink.on_topic(ALERTS_TOPIC)[0]["message"], "Wrong pallet colour");
        assert_eq!(sink.count(ALERTS_TOPIC), 1);
    }

    #[test]
    fn test_no_check_class_reports_only_colour() {
        let (mut tracker, sink) = tracker(false, None);
        let mut detector = ScriptedDetector::new("pallets");
        feed(&mut tracker, &mut detector, 0.0, 5.0, BLUE);
        assert_eq!(tracker.outcome(), Some(true));
        assert_eq!(sink.count(STEP_RESULTS_TOPIC), 1);
        assert_eq!(detector.calls(), 0);
    }

    #[test]
    fn test_class_colour_fallback() {
        let (mut tracker, _) = tracker(true, Some("covered"));
        let mut detector = ScriptedDetector::new("pallets").repeating(vec![]);
        // Colour phase fails on a covered pallet, class phase accepts it.
        feed(&mut tracker, &mut detector, 0.0, 12.0, COVERED);
        let statuses: Vec<_> = tracker.steps().iter().map(|s| s.passed()).collect();
        assert_eq!(statuses, vec![false, true]);
    }

    #[test]
    fn test_skip_during_colour_leaves_class_unreported() {
        let (mut tracker, sink) = tracker(true, None);
        let mut detector = ScriptedDetector::new("pallets");
        feed(&mut tracker, &mut detector, 0.0, 1.0, GREY);
        tracker.skip("colour sticker missing");

        assert!(!tracker.is_active());
        assert_eq!(tracker.outcome(), Some(true));
        let events = sink.on_topic(STEP_RESULTS_TOPIC);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["step"], "pallet_color");
        assert_eq!(events[0]["skip"], true);

        feed(&mut tracker, &mut detector, 1.5, 20.0, BLUE);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_abort_during_class_phase_leaves_outcome_open() {
        let (mut tracker, sink) = tracker(true, None);
        let mut detector = ScriptedDetector::new("pallets").repeating(vec![]);
        feed(&mut tracker, &mut detector, 0.0, 1.0, BLUE);
        assert_eq!(tracker.steps().len(), 1);
        assert!(tracker.is_active());

        tracker.abort();
        assert!(!tracker.is_active());
        assert_eq!(tracker.outcome(), None);
        assert_eq!(sink.count(STEP_RESULTS_TOPIC), 1);
    }

    #[test]
    fn test_abort_after_completion_keeps_outcome() {
        let (mut tracker, _) = tracker(false, None);
        let mut detector = ScriptedDetector::new("pallets");
        feed(&mut tracker, &mut detector, 0.0, 5.0, BLUE);
        tracker.abort();
        assert_eq!(tracker.outcome(), Some(true));
    }

    #[test]
    fn test_frames_without_pixels_do_not_time_out_colour() {
        let (mut tracker, sink) = tracker(true, None);
        let mut detector = ScriptedDetector::new("pallets");
        for i in 0..40 {
            tracker.process(&Frame::empty("dock", f64::from(i)), &mut detector);
        }
        assert!(tracker.is_active());
        assert!(sink.is_empty());
    }
}
