//! The procedure orchestrator.
//!
//! Owns the active run: advances the ordered stage list one tracker at a
//! time, keeps at most one detector resident, rebinds the frame source per
//! stage, and finalizes and persists the run record.
//!
//! The run is driven synchronously by [`Orchestrator::on_frame`]. External
//! triggers (cancellation, label updates) reach it through the shared
//! [`RunContext`], read once per frame.

mod builder;
mod context;
mod run;

#[cfg(test)]
mod integration_tests;

pub use builder::OrchestratorBuilder;
pub use context::{LabelState, RunContext};
pub use run::{ProcedureRun, RunOutcome, StageResult, CANCELLATION_NOTE};

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, ResolvedProcedure};
use crate::errors::InspectflowError;
use crate::events::StepPublisher;
use crate::persistence::RunStore;
use crate::source::{FrameOutput, FrameSource};
use crate::stages::{StageTracker, TrackerFactory};
use crate::utils::Clock;
use crate::vision::{Detector, DetectorFactory, Frame};

/// Lifecycle of an orchestrator. One run per orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// No run started yet.
    Idle,
    /// A run is in progress; `None` before the first stage is entered.
    Running {
        /// Index of the current stage.
        stage_index: Option<usize>,
    },
    /// The run is being closed out.
    Finalizing,
    /// Every stage reached a terminal state.
    Completed,
    /// The run was cancelled.
    Cancelled,
}

impl OrchestratorState {
    /// Whether the single run has ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running { stage_index: Some(i) } => write!(f, "running({i})"),
            Self::Running { stage_index: None } => write!(f, "running(-)"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The stage in progress. Dropping it releases the detector.
struct ActiveStage {
    index: usize,
    source: String,
    tracker: Box<dyn StageTracker>,
    detector: Option<Box<dyn Detector>>,
}

struct ActiveRun {
    procedure: ResolvedProcedure,
    record: ProcedureRun,
    stage: Option<ActiveStage>,
    last_index: Option<usize>,
    alerts: Vec<String>,
}

/// Runs one procedure at a time over frames pushed by a frame source.
pub struct Orchestrator {
    catalog: Arc<Catalog>,
    detectors: Arc<dyn DetectorFactory>,
    source: Box<dyn FrameSource>,
    output: Arc<dyn FrameOutput>,
    store: Arc<dyn RunStore>,
    trackers: TrackerFactory,
    publisher: StepPublisher,
    clock: Arc<dyn Clock>,
    context: RunContext,
    frame_side: u32,
    state: OrchestratorState,
    run: Option<ActiveRun>,
    finished: Option<RunOutcome>,
}

impl Orchestrator {
    /// Starts building an orchestrator over `catalog`.
    #[must_use]
    pub fn builder(catalog: Arc<Catalog>, detectors: Arc<dyn DetectorFactory>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(catalog, detectors)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// The context shared with external listeners.
    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// The record of the run in progress.
    #[must_use]
    pub fn run(&self) -> Option<&ProcedureRun> {
        self.run.as_ref().map(|r| &r.record)
    }

    /// The outcome of the finished run.
    #[must_use]
    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.finished.as_ref()
    }

    /// Name of the stage being evaluated.
    #[must_use]
    pub fn current_stage(&self) -> Option<&str> {
        self.run
            .as_ref()
            .and_then(|r| r.stage.as_ref())
            .map(|s| s.tracker.stage())
    }

    /// Starts `procedure_id`.
    ///
    /// Substitutions are resolved here, the context is reset and the frame
    /// source is bound to the first stage's source. Nothing changes when
    /// the request is rejected.
    ///
    /// # Errors
    ///
    /// - `Configuration` when the procedure is not in the catalog.
    /// - `AlreadyRunning` while a run is in progress.
    /// - `Finished` once this orchestrator's run has ended.
    /// - `Source` when the first source cannot be opened.
    pub fn start(&mut self, procedure_id: &str) -> Result<(), InspectflowError> {
        match self.state {
            OrchestratorState::Idle => {}
            OrchestratorState::Running { .. } | OrchestratorState::Finalizing => {
                let active = self
                    .run
                    .as_ref()
                    .map(|r| r.procedure.id.clone())
                    .unwrap_or_default();
                warn!(procedure_id, active = %active, "Start rejected: a run is in progress");
                return Err(InspectflowError::AlreadyRunning { active });
            }
            OrchestratorState::Completed | OrchestratorState::Cancelled => {
                return Err(InspectflowError::Finished);
            }
        }

        let procedure = self.catalog.resolve(procedure_id).map_err(|e| {
            warn!(procedure_id, code = e.code(), "Start rejected: {e}");
            e
        })?;
        let first_source = procedure
            .stages
            .first()
            .map(|s| s.source.clone())
            .unwrap_or_default();
        self.source.start(&first_source)?;

        self.context.reset();
        let record = ProcedureRun::new(&procedure.id, procedure.stage_names(), self.clock.now());
        info!(
            procedure_id = %procedure.id,
            run_id = %record.run_id,
            stages = procedure.stages.len(),
            source = %first_source,
            "Procedure started"
        );
        self.run = Some(ActiveRun {
            procedure,
            record,
            stage: None,
            last_index: None,
            alerts: Vec::new(),
        });
        self.state = OrchestratorState::Running { stage_index: None };
        Ok(())
    }

    /// Requests cancellation. Observed at the next frame, or at once by
    /// [`Orchestrator::observe_cancellation`].
    pub fn cancel(&self, reason: &str) -> bool {
        self.context.cancel.cancel(reason)
    }

    /// Force-completes the active step with `skip=true`.
    ///
    /// Returns false when no stage is being evaluated.
    pub fn skip(&mut self, justification: &str) -> bool {
        let Some(stage) = self.run.as_mut().and_then(|r| r.stage.as_mut()) else {
            return false;
        };
        if !stage.tracker.is_active() {
            return false;
        }
        info!(stage = stage.tracker.stage(), justification, "Stage skipped by operator");
        stage.tracker.skip(justification);
        true
    }

    /// Feeds one frame from the source.
    ///
    /// Frames from any source other than the current stage's are dropped,
    /// including the one that moved the run onto a stage bound elsewhere.
    /// Returns the outcome when the run ends on this frame.
    pub fn on_frame(&mut self, frame: Frame) -> Option<RunOutcome> {
        if !matches!(self.state, OrchestratorState::Running { .. }) {
            debug!(state = %self.state, "Frame ignored: no run in progress");
            return None;
        }
        if let Some(outcome) = self.observe_cancellation() {
            return Some(outcome);
        }

        let current_done = self
            .run
            .as_ref()
            .and_then(|r| r.stage.as_ref())
            .map_or(true, |s| !s.tracker.is_active());
        if current_done {
            if let Some(outcome) = self.advance() {
                return Some(outcome);
            }
        }

        let stage = self.run.as_mut().and_then(|r| r.stage.as_mut())?;
        if frame.source_id != stage.source {
            debug!(
                stage = stage.tracker.stage(),
                expected = %stage.source,
                got = %frame.source_id,
                "Frame dropped: not from the stage's source"
            );
            return None;
        }
        let frame = frame.normalized(self.frame_side);
        let Some(detector) = stage.detector.as_mut() else {
            return None;
        };
        let annotated = stage.tracker.process(&frame, detector.as_mut());
        self.output.send(annotated);
        None
    }

    /// Finalizes as cancelled if cancellation was requested.
    pub fn observe_cancellation(&mut self) -> Option<RunOutcome> {
        if !matches!(self.state, OrchestratorState::Running { .. }) || !self.context.cancel.is_cancelled() {
            return None;
        }
        let reason = self.context.cancel.reason().unwrap_or_default();
        info!(reason = %reason, "Cancellation observed");
        Some(self.finalize(true))
    }

    /// Closes the run when the frame source has no more frames.
    ///
    /// A run whose last stage already ended completes; anything else is
    /// cancelled.
    pub fn end_of_stream(&mut self) -> Option<RunOutcome> {
        if !matches!(self.state, OrchestratorState::Running { .. }) {
            return None;
        }
        let last_done = self.run.as_ref().is_some_and(|r| {
            r.stage.as_ref().is_some_and(|s| {
                !s.tracker.is_active() && s.index + 1 == r.procedure.stages.len()
            })
        });
        if last_done {
            self.advance()
        } else {
            self.context.cancel.cancel("frame source closed");
            self.observe_cancellation()
        }
    }

    /// Leaves the current stage and enters the next one that can run,
    /// finalizing when none is left.
    fn advance(&mut self) -> Option<RunOutcome> {
        loop {
            let run = self.run.as_mut()?;
            if let Some(done) = run.stage.take() {
                close_stage(run, done);
            }
            let next = run.last_index.map_or(0, |i| i + 1);
            let Some(definition) = run.procedure.stages.get(next).cloned() else {
                return Some(self.finalize(false));
            };
            self.state = OrchestratorState::Running { stage_index: Some(next) };

            let tracker = match self.trackers.build(&definition, &run.procedure) {
                Ok(tracker) => tracker,
                Err(e) => {
                    error!(stage = %definition.name, diagnostic = %e.info.to_json(), "Stage unavailable: {e}");
                    let message = format!("Stage '{}' unavailable: {}", definition.name, e.info.summary);
                    self.publisher.alert(&definition.name, &message);
                    run.alerts.push(message);
                    run.record.mark_unchecked(next);
                    run.last_index = Some(next);
                    continue;
                }
            };
            let detector = match self.detectors.load(&definition.detector_model) {
                Ok(detector) => Some(detector),
                Err(e) => {
                    error!(stage = %definition.name, model = %definition.detector_model, "Detector unavailable: {e}");
                    let message = format!("Detector for stage '{}' unavailable", definition.name);
                    self.publisher.alert(&definition.name, &message);
                    run.alerts.push(message);
                    None
                }
            };

            let rebind = self.source.current() != Some(definition.source.as_str());
            if rebind {
                self.source.stop();
                if let Err(e) = self.source.start(&definition.source) {
                    warn!(stage = %definition.name, "Frame source rebind failed: {e}");
                }
            }
            info!(
                procedure_id = %run.procedure.id,
                stage = %definition.name,
                stage_index = next,
                kind = definition.kind.tag(),
                source = %definition.source,
                rebind,
                "Stage started"
            );

            let mut stage = ActiveStage {
                index: next,
                source: definition.source.clone(),
                tracker,
                detector,
            };
            if stage.detector.is_none() {
                stage.tracker.abort();
                close_stage(run, stage);
                run.record.mark_unchecked(next);
                continue;
            }
            run.stage = Some(stage);
            return None;
        }
    }

    fn finalize(&mut self, cancelled: bool) -> RunOutcome {
        self.state = OrchestratorState::Finalizing;
        let Some(mut run) = self.run.take() else {
            // Unreachable from the public surface; keep the state coherent.
            self.state = OrchestratorState::Cancelled;
            let record = ProcedureRun::new("", std::iter::empty::<&str>(), self.clock.now());
            return RunOutcome::Cancelled(record);
        };

        if let Some(mut stage) = run.stage.take() {
            if cancelled {
                stage.tracker.abort();
            }
            close_stage(&mut run, stage);
        }
        self.source.stop();

        let mut record = run.record;
        let now = self.clock.now();
        record.end_time = Some(now.max(record.start_time));
        let (label_value, label_count) = self.context.labels.snapshot();
        record.label_value = label_value;
        record.label_count = label_count;
        record.alert_summary = run.alerts.join("; ");
        if cancelled {
            record.cancelled = true;
            record.observation_text = Some(CANCELLATION_NOTE.to_string());
        }

        if let Err(e) = self.store.append(&record) {
            warn!(run_id = %record.run_id, procedure_id = %record.procedure_id, "Run record not persisted: {e}");
        }
        info!(
            procedure_id = %record.procedure_id,
            run_id = %record.run_id,
            cancelled,
            passed = record.passed(),
            alerts = %record.alert_summary,
            "Procedure finalized"
        );

        let outcome = if cancelled {
            self.state = OrchestratorState::Cancelled;
            RunOutcome::Cancelled(record)
        } else {
            self.state = OrchestratorState::Completed;
            RunOutcome::Completed(record)
        };
        self.finished = Some(outcome.clone());
        outcome
    }
}

/// Records a stage's outcome, steps and alerts, then drops it along with
/// its detector. Leaves `run.stage` pointing at nothing.
fn close_stage(run: &mut ActiveRun, stage: ActiveStage) {
    let outcome = stage.tracker.outcome();
    debug!(stage = stage.tracker.stage(), ?outcome, "Stage closed");
    run.alerts
        .extend(stage.tracker.alerts().into_iter().map(str::to_string));
    run.record
        .record_stage(stage.index, outcome, stage.tracker.steps());
    run.last_index = Some(stage.index);
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state)
            .field("procedure", &self.run.as_ref().map(|r| r.procedure.id.as_str()))
            .field("stage", &self.current_stage())
            .field("frame_side", &self.frame_side)
            .finish_non_exhaustive()
    }
}
