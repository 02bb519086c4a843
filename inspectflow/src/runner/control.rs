//! Translation of subscribed bus messages into run-context updates.

use serde_json::Value;
use tracing::{debug, info};

use crate::core::{CANCELLATION_TOPIC, LABELS_TOPIC, PROCEDURE_REQUESTS_TOPIC};
use crate::orchestrator::RunContext;

/// What a control message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Cancellation was requested (or was already pending).
    Cancel {
        /// Reason carried by the message, or a default.
        reason: String,
    },
    /// A label value was recorded.
    Label {
        /// The value.
        value: String,
    },
    /// A procedure start was requested. The owner decides whether to act.
    Start {
        /// Requested procedure.
        procedure_id: String,
    },
    /// The message was not for us or carried nothing usable.
    Ignored,
}

/// Applies one subscribed message to `context`.
///
/// Any object on the cancellation topic cancels, with an optional
/// `"reason"`. Label updates carry the value under `"label"` (or
/// `"value"`); every non-empty update counts. Start requests carry
/// `"procedure"` and are only decoded here.
pub fn apply_control_message(topic: &str, payload: &Value, context: &RunContext) -> ControlMessage {
    if !payload.is_object() {
        debug!(topic, "Control message ignored: payload is not an object");
        return ControlMessage::Ignored;
    }
    match topic {
        CANCELLATION_TOPIC => {
            let reason = payload
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("cancellation requested")
                .to_string();
            if context.cancel.cancel(reason.as_str()) {
                info!(reason = %reason, "Cancellation requested");
            }
            ControlMessage::Cancel { reason }
        }
        LABELS_TOPIC => match payload.get("label").or_else(|| payload.get("value")).and_then(scalar) {
            Some(value) => {
                context.labels.record(value.as_str());
                debug!(label = %value, count = context.labels.count(), "Label recorded");
                ControlMessage::Label { value }
            }
            None => ControlMessage::Ignored,
        },
        PROCEDURE_REQUESTS_TOPIC => match payload.get("procedure").and_then(scalar) {
            Some(procedure_id) => ControlMessage::Start { procedure_id },
            None => ControlMessage::Ignored,
        },
        _ => ControlMessage::Ignored,
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
