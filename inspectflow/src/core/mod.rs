//! Core domain types shared by gates, trackers and the orchestrator.
//!
//! - Gate state and verdict enums
//! - Step-result and alert payloads with their bus topics

mod event;
mod status;

pub use event::{
    AlertEvent, StepEvent, ALERTS_TOPIC, CANCELLATION_TOPIC, LABELS_TOPIC, PROCEDURE_REQUESTS_TOPIC,
    STEP_RESULTS_TOPIC,
};
pub use status::{GateState, GateVerdict};
