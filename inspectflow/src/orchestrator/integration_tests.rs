//! End-to-end runs of the orchestrator over the sample catalog.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use super::*;
use crate::core::{ALERTS_TOPIC, STEP_RESULTS_TOPIC};
use crate::errors::PersistenceError;
use crate::events::CollectingEventSink;
use crate::persistence::{InMemoryRunStore, MockRunStore};
use crate::source::QueuedFrameOutput;
use crate::testing::{
    assert_alert_published, assert_step_published, detection_in, frame_at, frame_from, sample_catalog_json,
    CountingDetectorFactory, RecordingFrameSource, SourceCall, DOCK_ROI, EXIT_ROI,
};
use crate::utils::ManualClock;
use crate::vision::Frame;

const STEP: f64 = 0.5;

/// The vehicle stands at the dock until 24s, the truck is seen at the exit
/// until 27s, then the scene is empty. Garments are never detected.
fn dock_scene(model: &str, t: f64) -> Vec<crate::vision::Detection> {
    match model {
        "people" if t < 24.0 => vec![detection_in(&DOCK_ROI, "van", 0.9)],
        "people" if t < 27.0 => vec![detection_in(&EXIT_ROI, "truck", 0.9)],
        _ => vec![],
    }
}

/// Like [`dock_scene`], with the expected garment always in view.
fn dressed_scene(model: &str, t: f64) -> Vec<crate::vision::Detection> {
    match model {
        "garments" => vec![detection_in(&DOCK_ROI, "white_coat", 0.9)],
        _ => dock_scene(model, t),
    }
}

struct Harness {
    orchestrator: Orchestrator,
    detectors: Arc<CountingDetectorFactory>,
    source: RecordingFrameSource,
    sink: Arc<CollectingEventSink>,
    store: Arc<InMemoryRunStore>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new(detectors: CountingDetectorFactory) -> Self {
        Self::with_store(detectors, None)
    }

    fn with_store(detectors: CountingDetectorFactory, store: Option<Arc<dyn RunStore>>) -> Self {
        let catalog = Arc::new(Catalog::from_json_str(&sample_catalog_json()).unwrap());
        let detectors = Arc::new(detectors);
        let source = RecordingFrameSource::new();
        let sink = Arc::new(CollectingEventSink::new());
        let memory = Arc::new(InMemoryRunStore::new());
        let clock = Arc::new(ManualClock::default());
        let store: Arc<dyn RunStore> = match store {
            Some(store) => store,
            None => memory.clone(),
        };
        let orchestrator = Orchestrator::builder(catalog, detectors.clone())
            .with_source(source.clone())
            .with_sink(sink.clone())
            .with_store(store)
            .with_clock(clock.clone())
            .build();
        Self {
            orchestrator,
            detectors,
            source,
            sink,
            store: memory,
            clock,
        }
    }

    /// Feeds one frame every half second from `from` up to `to`, stopping
    /// at the first outcome. Each frame comes from whichever source is
    /// bound when it is captured.
    fn feed(&mut self, from: f64, to: f64) -> Option<RunOutcome> {
        let mut t = from;
        while t <= to {
            self.clock.advance_secs(STEP);
            let source = self.source.bound().unwrap_or_default();
            if let Some(outcome) = self.orchestrator.on_frame(frame_from(&source, t)) {
                return Some(outcome);
            }
            assert!(self.detectors.resident() <= 1);
            t += STEP;
        }
        None
    }
}

#[test]
fn test_stage_timeout_is_reported_in_order_with_one_alert() {
    let mut h = Harness::new(CountingDetectorFactory::new(dock_scene));
    h.orchestrator.start("inspection-short").unwrap();

    let outcome = h.feed(0.0, 60.0).expect("run should complete");

    assert!(!outcome.is_cancelled());
    let run = outcome.into_run();
    assert_eq!(run.outcomes(), vec![Some(true), Some(false), Some(true)]);
    assert_eq!(h.sink.count(ALERTS_TOPIC), 1);
    assert_alert_published(&h.sink, "garment");
    assert_step_published(&h.sink, "arrival", true);
    assert_step_published(&h.sink, "garment", false);
    assert_step_published(&h.sink, "finish", true);
    assert_eq!(run.alert_summary, "Wrong garment");
    assert!(!run.passed());
    assert_eq!(h.orchestrator.state(), OrchestratorState::Completed);
}

#[test]
fn test_stage_boundaries_follow_frame_times() {
    let mut h = Harness::new(CountingDetectorFactory::new(dock_scene));
    h.orchestrator.start("inspection-short").unwrap();

    // Arrival holds from 0s and is satisfied at 4s.
    assert!(h.feed(0.0, 4.0).is_none());
    assert_eq!(h.orchestrator.current_stage(), Some("arrival"));
    assert_eq!(h.sink.count(STEP_RESULTS_TOPIC), 1);

    // The next frame enters the garment stage. It was captured by the dock
    // camera, so the garment stage does not see it.
    assert!(h.feed(4.5, 4.5).is_none());
    assert_eq!(h.orchestrator.current_stage(), Some("garment"));
    assert_eq!(h.orchestrator.state(), OrchestratorState::Running { stage_index: Some(1) });

    // Garment armed by its first own frame at 5s times out once more than
    // 19s have passed.
    assert!(h.feed(5.0, 24.0).is_none());
    assert_eq!(h.sink.count(ALERTS_TOPIC), 0);
    assert!(h.feed(24.5, 24.5).is_none());
    assert_eq!(h.sink.count(ALERTS_TOPIC), 1);

    // Finish: armed at 25.5s with the truck in view, gone from 27s,
    // departed at 31s.
    assert!(h.feed(25.0, 31.0).is_none());
    assert!(h.feed(31.5, 31.5).is_some());
}

#[test]
fn test_single_resident_detector_and_source_rebinding() {
    let mut h = Harness::new(CountingDetectorFactory::new(dock_scene));
    h.orchestrator.start("inspection-short").unwrap();
    h.feed(0.0, 60.0).unwrap();

    assert_eq!(h.detectors.max_resident(), 1);
    assert_eq!(h.detectors.resident(), 0);
    assert_eq!(h.detectors.loads(), vec!["people", "garments", "people"]);
    assert_eq!(h.source.started(), vec!["dock", "garment_cam", "dock"]);
    assert_eq!(h.source.calls().last(), Some(&SourceCall::Stop));
}

#[test]
fn test_run_is_persisted_once() {
    let mut h = Harness::new(CountingDetectorFactory::new(dock_scene));
    h.orchestrator.start("inspection-short").unwrap();
    h.orchestrator.context().labels.record("L-100");
    h.orchestrator.context().labels.record("L-101");
    let outcome = h.feed(0.0, 60.0).unwrap();

    assert_eq!(h.store.len(), 1);
    let stored = h.store.last().unwrap();
    assert_eq!(&stored, outcome.run());
    assert_eq!(stored.procedure_id, "inspection-short");
    assert_eq!(stored.label_value.as_deref(), Some("L-101"));
    assert_eq!(stored.label_count, 2);
    assert!(stored.end_time.unwrap() >= stored.start_time);
    assert_eq!(stored.steps.len(), 3);
    assert_eq!(h.orchestrator.outcome(), Some(&outcome));
}

#[test]
fn test_skip_completes_stage_with_justification() {
    let mut h = Harness::new(CountingDetectorFactory::new(dock_scene));
    h.orchestrator.start("inspection-short").unwrap();
    assert!(h.feed(0.0, 6.0).is_none());
    assert_eq!(h.orchestrator.current_stage(), Some("garment"));

    assert!(h.orchestrator.skip("checked by supervisor"));
    assert!(!h.orchestrator.skip("twice"));

    let run = h.feed(6.5, 60.0).unwrap().into_run();
    assert_eq!(run.outcome_of("garment"), Some(Some(true)));
    let garment = run.steps.iter().find(|s| s.stage == "garment").unwrap();
    assert!(garment.skipped());
    assert_eq!(garment.justification.as_deref(), Some("checked by supervisor"));
    assert_eq!(h.sink.count(ALERTS_TOPIC), 0);

    let payload = &h.sink.on_topic(STEP_RESULTS_TOPIC)[1];
    assert_eq!(payload["skip"], true);
    assert_eq!(payload["justification"], "checked by supervisor");
}

#[test]
fn test_cancellation_is_observed_at_next_frame() {
    let mut h = Harness::new(CountingDetectorFactory::new(dock_scene));
    h.orchestrator.start("inspection-short").unwrap();
    assert!(h.feed(0.0, 2.0).is_none());

    assert!(h.orchestrator.cancel("operator request"));
    assert_eq!(h.orchestrator.state(), OrchestratorState::Running { stage_index: Some(0) });

    let outcome = h.feed(2.5, 2.5).unwrap();
    assert!(outcome.is_cancelled());
    let run = outcome.run();
    assert!(run.cancelled);
    assert_eq!(run.observation_text.as_deref(), Some(CANCELLATION_NOTE));
    assert!(run.end_time.unwrap() >= run.start_time);
    assert_eq!(run.outcomes(), vec![None, None, None]);
    assert_eq!(h.sink.count(STEP_RESULTS_TOPIC), 0);

    assert_eq!(h.orchestrator.state(), OrchestratorState::Cancelled);
    assert_eq!(h.detectors.resident(), 0);
    assert_eq!(h.source.calls().last(), Some(&SourceCall::Stop));
    assert_eq!(h.store.len(), 1);

    // Later frames are ignored and the orchestrator cannot run again.
    assert!(h.orchestrator.on_frame(frame_at(3.0)).is_none());
    assert!(matches!(
        h.orchestrator.start("inspection-short"),
        Err(InspectflowError::Finished)
    ));
}

#[test]
fn test_cancellation_without_frames() {
    let mut h = Harness::new(CountingDetectorFactory::empty());
    h.orchestrator.start("inspection-short").unwrap();
    assert!(h.orchestrator.observe_cancellation().is_none());

    h.orchestrator.context().cancel.cancel("bus");
    let outcome = h.orchestrator.observe_cancellation().unwrap();
    assert!(outcome.is_cancelled());
    assert!(h.detectors.loads().is_empty());
}

#[test]
fn test_stale_cancellation_is_cleared_at_start() {
    let mut h = Harness::new(CountingDetectorFactory::new(dock_scene));
    h.orchestrator.context().cancel.cancel("left over");
    h.orchestrator.context().labels.record("old");
    h.orchestrator.start("inspection-short").unwrap();

    assert!(h.feed(0.0, 1.0).is_none());
    assert_eq!(h.orchestrator.context().labels.count(), 0);
}

#[test]
fn test_persistence_failure_does_not_block_termination() {
    let mut store = MockRunStore::new();
    store
        .expect_append()
        .times(1)
        .returning(|_| Err(PersistenceError::Rejected("database offline".into())));
    let store: Arc<dyn RunStore> = Arc::new(store);
    let mut h = Harness::with_store(CountingDetectorFactory::new(dock_scene), Some(store));
    h.orchestrator.start("inspection-short").unwrap();

    let outcome = h.feed(0.0, 60.0).unwrap();
    assert!(!outcome.is_cancelled());
    assert_eq!(h.orchestrator.state(), OrchestratorState::Completed);
    assert_eq!(h.detectors.resident(), 0);
}

#[test]
fn test_unknown_procedure_leaves_state_unchanged() {
    let mut h = Harness::new(CountingDetectorFactory::empty());
    let err = h.orchestrator.start("ghost").unwrap_err();
    match err {
        InspectflowError::Configuration(config) => {
            assert_eq!(config.code(), "CATALOG-001-UNKNOWN_PROCEDURE");
        }
        other => panic!("expected a configuration error, got {other}"),
    }
    assert_eq!(h.orchestrator.state(), OrchestratorState::Idle);
    assert!(h.source.calls().is_empty());

    h.orchestrator.start("inspection-short").unwrap();
    assert_eq!(h.orchestrator.state(), OrchestratorState::Running { stage_index: None });
}

#[test]
fn test_second_start_is_rejected_while_running() {
    let mut h = Harness::new(CountingDetectorFactory::empty());
    h.orchestrator.start("inspection-short").unwrap();
    let err = h.orchestrator.start("dispatch-standard").unwrap_err();
    assert!(matches!(err, InspectflowError::AlreadyRunning { ref active } if active == "inspection-short"));
    assert_eq!(h.orchestrator.run().unwrap().procedure_id, "inspection-short");
}

#[test]
fn test_frames_before_start_are_ignored() {
    let mut h = Harness::new(CountingDetectorFactory::new(dock_scene));
    assert!(h.orchestrator.on_frame(frame_at(0.0)).is_none());
    assert!(h.detectors.loads().is_empty());
    assert_eq!(h.orchestrator.state(), OrchestratorState::Idle);
}

#[test]
fn test_detector_load_failure_skips_stage_with_alert() {
    let detectors = CountingDetectorFactory::new(dock_scene);
    detectors.fail_model("garments");
    let mut h = Harness::new(detectors);
    h.orchestrator.start("inspection-short").unwrap();

    let run = h.feed(0.0, 60.0).unwrap().into_run();
    assert_eq!(run.outcomes(), vec![Some(true), None, Some(true)]);
    assert_eq!(run.unchecked_stages(), vec!["garment"]);
    assert!(!run.passed());
    assert_eq!(run.alert_summary, "Detector for stage 'garment' unavailable");
    assert_alert_published(&h.sink, "garment");
    assert_eq!(h.detectors.loads(), vec!["people", "people"]);
}

#[test]
fn test_substitution_and_exemption_in_pulp_procedure() {
    let mut h = Harness::new(CountingDetectorFactory::empty());
    h.orchestrator.start("dispatch-pulp").unwrap();
    let names: Vec<_> = h
        .orchestrator
        .run()
        .unwrap()
        .stage_results
        .iter()
        .map(|r| r.stage.clone())
        .collect();
    assert_eq!(names[3], "unload_cycle");

    // Arrival never sees the vehicle; skip it and let the exempt garment
    // stage pass through.
    h.feed(0.0, 0.0);
    h.orchestrator.skip("vehicle confirmed by radio");
    h.feed(0.5, 1.5);
    assert_eq!(h.orchestrator.current_stage(), Some("pallet"));
    let run = h.orchestrator.run().unwrap();
    assert_eq!(run.outcome_of("garment"), Some(None));
    assert!(run.unchecked_stages().is_empty());
}

#[test]
fn test_frames_from_other_sources_do_not_reach_the_stage() {
    let mut h = Harness::new(CountingDetectorFactory::new(dressed_scene));
    h.orchestrator.start("inspection-short").unwrap();

    // Only the dock camera delivers; the garment stage watches garment_cam.
    let mut t = 0.0;
    while t <= 30.0 {
        assert!(h.orchestrator.on_frame(frame_from("dock", t)).is_none());
        t += STEP;
    }
    assert_eq!(h.orchestrator.current_stage(), Some("garment"));
    assert_eq!(h.orchestrator.run().unwrap().outcomes(), vec![Some(true), None, None]);
    assert_eq!(h.sink.count(STEP_RESULTS_TOPIC), 1);
    assert_eq!(h.sink.count(ALERTS_TOPIC), 0);

    // Its own frames arm and satisfy it.
    assert!(h.feed(30.5, 33.5).is_none());
    assert_step_published(&h.sink, "garment", true);
}

#[test]
fn test_unavailable_detectors_mark_stages_unchecked() {
    let detectors = CountingDetectorFactory::new(dock_scene);
    detectors.fail_model("people");
    let mut h = Harness::new(detectors);
    h.orchestrator.start("inspection-short").unwrap();

    // Arrival and finish are unavailable; garment times out on its own.
    let run = h.feed(0.0, 60.0).unwrap().into_run();
    assert_eq!(run.outcomes(), vec![None, Some(false), None]);
    assert_eq!(run.unchecked_stages(), vec!["arrival", "finish"]);
    assert!(!run.passed());
}

#[test]
fn test_frames_are_normalized_before_processing() {
    let catalog = Arc::new(Catalog::from_json_str(&sample_catalog_json()).unwrap());
    let (output, mut rx) = QueuedFrameOutput::new(4);
    let mut orchestrator = Orchestrator::builder(catalog, Arc::new(CountingDetectorFactory::empty()))
        .with_output(Arc::new(output))
        .build();
    orchestrator.start("inspection-short").unwrap();

    orchestrator.on_frame(Frame::solid("dock", 0.0, 320, [10, 20, 30]));
    let annotated = rx.try_recv().unwrap();
    assert_eq!(annotated.frame.width(), 640);
    assert_eq!(annotated.frame.height(), 640);
}

#[test]
fn test_end_of_stream_completes_only_after_last_stage() {
    let mut h = Harness::new(CountingDetectorFactory::new(dock_scene));
    h.orchestrator.start("inspection-short").unwrap();
    assert!(h.feed(0.0, 31.0).is_none());
    let outcome = h.orchestrator.end_of_stream().unwrap();
    assert!(!outcome.is_cancelled());

    let mut h = Harness::new(CountingDetectorFactory::new(dock_scene));
    h.orchestrator.start("inspection-short").unwrap();
    assert!(h.feed(0.0, 10.0).is_none());
    let outcome = h.orchestrator.end_of_stream().unwrap();
    assert!(outcome.is_cancelled());
}
