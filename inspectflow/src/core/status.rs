//! Gate state and verdict enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a stage gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// Created, no observation yet.
    Armed,
    /// Observing; neither satisfied nor timed out.
    Waiting,
    /// The signal held continuously for the required duration.
    Satisfied,
    /// The timeout elapsed without satisfaction.
    TimedOut,
}

impl Default for GateState {
    fn default() -> Self {
        Self::Armed
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Armed => write!(f, "armed"),
            Self::Waiting => write!(f, "waiting"),
            Self::Satisfied => write!(f, "satisfied"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl GateState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Satisfied | Self::TimedOut)
    }

    /// The verdict a gate in this state reports.
    #[must_use]
    pub fn verdict(&self) -> GateVerdict {
        match self {
            Self::Satisfied => GateVerdict::Satisfied,
            Self::TimedOut => GateVerdict::TimedOut,
            Self::Armed | Self::Waiting => GateVerdict::Pending,
        }
    }
}

/// Result of feeding one observation to a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVerdict {
    /// Keep observing.
    Pending,
    /// The completion criterion holds.
    Satisfied,
    /// The timeout elapsed first.
    TimedOut,
}

impl fmt::Display for GateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Satisfied => write!(f, "satisfied"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl GateVerdict {
    /// Returns true if the verdict is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}
