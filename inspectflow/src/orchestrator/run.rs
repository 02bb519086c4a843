//! The run record and how a run ends.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::stages::StepRecord;
use crate::utils::{generate_run_id, Timestamp};

/// Note persisted with a cancelled run.
pub const CANCELLATION_NOTE: &str = "Operation cancelled.";

/// Outcome of one stage, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub stage: String,
    /// `Some(passed)` once decided; `None` when exempt, never reached, or
    /// unavailable.
    pub outcome: Option<bool>,
    /// The stage could not be evaluated (tracker or detector unavailable).
    #[serde(default)]
    pub unchecked: bool,
}

/// The record of one procedure run.
///
/// Created at start with one pending result per stage, filled in by the
/// orchestrator as stages end, and frozen at finalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureRun {
    /// Unique, time-ordered run identifier.
    pub run_id: Uuid,
    /// Procedure that ran.
    pub procedure_id: String,
    /// When the run started.
    pub start_time: Timestamp,
    /// When the run ended.
    pub end_time: Option<Timestamp>,
    /// Stage outcomes in catalog order.
    pub stage_results: Vec<StageResult>,
    /// Every terminal step transition, including skip justifications.
    pub steps: Vec<StepRecord>,
    /// Last label value received during the run.
    pub label_value: Option<String>,
    /// Number of label updates received during the run.
    pub label_count: u64,
    /// Alert texts of the run, in stage order.
    pub alert_summary: String,
    /// Free-form note, such as the cancellation note.
    pub observation_text: Option<String>,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

impl ProcedureRun {
    /// Creates a record with every stage pending.
    #[must_use]
    pub fn new<'a>(
        procedure_id: impl Into<String>,
        stages: impl IntoIterator<Item = &'a str>,
        start_time: Timestamp,
    ) -> Self {
        Self {
            run_id: generate_run_id(),
            procedure_id: procedure_id.into(),
            start_time,
            end_time: None,
            stage_results: stages
                .into_iter()
                .map(|stage| StageResult {
                    stage: stage.to_string(),
                    outcome: None,
                    unchecked: false,
                })
                .collect(),
            steps: Vec::new(),
            label_value: None,
            label_count: 0,
            alert_summary: String::new(),
            observation_text: None,
            cancelled: false,
        }
    }

    /// Records the end of the stage at `index`.
    pub(crate) fn record_stage(&mut self, index: usize, outcome: Option<bool>, steps: &[StepRecord]) {
        if let Some(result) = self.stage_results.get_mut(index) {
            result.outcome = outcome;
        }
        self.steps.extend_from_slice(steps);
    }

    /// Marks the stage at `index` as never evaluated.
    pub(crate) fn mark_unchecked(&mut self, index: usize) {
        if let Some(result) = self.stage_results.get_mut(index) {
            result.outcome = None;
            result.unchecked = true;
        }
    }

    /// Names of the stages that could not be evaluated.
    #[must_use]
    pub fn unchecked_stages(&self) -> Vec<&str> {
        self.stage_results
            .iter()
            .filter(|r| r.unchecked)
            .map(|r| r.stage.as_str())
            .collect()
    }

    /// Outcome of `stage`, if it is part of the run.
    #[must_use]
    pub fn outcome_of(&self, stage: &str) -> Option<Option<bool>> {
        self.stage_results
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| r.outcome)
    }

    /// Outcomes in catalog order.
    #[must_use]
    pub fn outcomes(&self) -> Vec<Option<bool>> {
        self.stage_results.iter().map(|r| r.outcome).collect()
    }

    /// True when the run completed with no failed and no unchecked stage.
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.cancelled
            && self
                .stage_results
                .iter()
                .all(|r| !r.unchecked && r.outcome != Some(false))
    }

    /// Seconds between start and end, once ended.
    #[must_use]
    pub fn duration_seconds(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }
}

/// How a run ended, handed back to the run's owner.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every stage reached a terminal state.
    Completed(ProcedureRun),
    /// The run was cancelled.
    Cancelled(ProcedureRun),
}

impl RunOutcome {
    /// The finalized record.
    #[must_use]
    pub fn run(&self) -> &ProcedureRun {
        match self {
            Self::Completed(run) | Self::Cancelled(run) => run,
        }
    }

    /// Consumes the outcome, returning the record.
    #[must_use]
    pub fn into_run(self) -> ProcedureRun {
        match self {
            Self::Completed(run) | Self::Cancelled(run) => run,
        }
    }

    /// Whether the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(run) => write!(f, "completed ({})", run.procedure_id),
            Self::Cancelled(run) => write!(f, "cancelled ({})", run.procedure_id),
        }
    }
}
