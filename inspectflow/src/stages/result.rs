//! Per-step audit records kept by every tracker.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::StepEvent;

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The criterion held.
    Passed,
    /// The step timed out.
    Failed,
    /// The operator force-completed the step.
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// The persisted record of one terminal step transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Owning stage.
    pub stage: String,
    /// Step name.
    pub step: String,
    /// Operator-facing description.
    pub description: String,
    /// How the step ended.
    pub status: StepStatus,
    /// Operator justification, kept for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    /// Alert text raised with a timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    /// When the step ended (ISO 8601).
    pub timestamp: String,
}

impl StepRecord {
    /// Whether the step counts as passed. Skips pass.
    #[must_use]
    pub fn passed(&self) -> bool {
        !matches!(self.status, StepStatus::Failed)
    }

    /// Whether the operator skipped the step.
    #[must_use]
    pub fn skipped(&self) -> bool {
        matches!(self.status, StepStatus::Skipped)
    }

    /// The bus event for this record.
    #[must_use]
    pub fn to_event(&self) -> StepEvent {
        let event = StepEvent::new(
            &self.stage,
            &self.step,
            &self.description,
            self.passed(),
            &self.timestamp,
        );
        match &self.justification {
            Some(justification) if self.skipped() => event.skipped(justification),
            _ => event,
        }
    }
}
