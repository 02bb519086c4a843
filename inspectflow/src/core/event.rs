//! Payloads published on the message bus.

use serde::{Deserialize, Serialize};

/// Topic carrying one event per terminal step transition.
pub const STEP_RESULTS_TOPIC: &str = "step-results";
/// Topic carrying timeout alerts.
pub const ALERTS_TOPIC: &str = "alerts";
/// Subscribed topic requesting cancellation of the active run.
pub const CANCELLATION_TOPIC: &str = "cancellation-signal";
/// Subscribed topic carrying label-value updates.
pub const LABELS_TOPIC: &str = "label-values";
/// Subscribed topic asking for a procedure to start.
pub const PROCEDURE_REQUESTS_TOPIC: &str = "procedure-requests";

/// Outcome of one step, published when the step reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    /// Stage that owns the step.
    pub stage: String,
    /// Step name; two-phase stages publish two distinct names.
    pub step: String,
    /// Operator-facing description.
    pub description: String,
    /// Whether the step passed.
    pub passed: bool,
    /// Whether the step was force-completed by the operator.
    pub skip: bool,
    /// Operator justification for a skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    /// When the transition happened (ISO 8601).
    pub timestamp: String,
}

impl StepEvent {
    /// Creates a step event for a gate verdict.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        step: impl Into<String>,
        description: impl Into<String>,
        passed: bool,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            step: step.into(),
            description: description.into(),
            passed,
            skip: false,
            justification: None,
            timestamp: timestamp.into(),
        }
    }

    /// Marks the event as an operator skip.
    #[must_use]
    pub fn skipped(mut self, justification: impl Into<String>) -> Self {
        self.passed = true;
        self.skip = true;
        self.justification = Some(justification.into());
        self
    }

    /// Renders the bus payload.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Alert raised once when a step times out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Always true; lets consumers sharing a topic tell alerts apart.
    pub alert: bool,
    /// Alert severity class.
    #[serde(rename = "type")]
    pub kind: String,
    /// Stage that raised the alert.
    pub stage: String,
    /// Operator-facing message.
    pub message: String,
    /// When the alert was raised (ISO 8601).
    pub timestamp: String,
}

impl AlertEvent {
    /// Creates an informational alert.
    #[must_use]
    pub fn info(stage: impl Into<String>, message: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            alert: true,
            kind: "info".to_string(),
            stage: stage.into(),
            message: message.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Renders the bus payload.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TS: &str = "2026-01-05T10:00:00.000000+00:00";

    #[test]
    fn test_step_payload_shape() {
        let event = StepEvent::new("arrival", "arrival", "Pallet positioned", true, TS);
        assert_eq!(
            event.to_payload(),
            serde_json::json!({
                "stage": "arrival",
                "step": "arrival",
                "description": "Pallet positioned",
                "passed": true,
                "skip": false,
                "timestamp": TS,
            })
        );
    }

    #[test]
    fn test_skipped_step_carries_justification() {
        let event = StepEvent::new("wrap", "wrap", "Pallet wrapped", false, TS).skipped("camera blocked");
        let payload = event.to_payload();
        assert_eq!(payload["passed"], true);
        assert_eq!(payload["skip"], true);
        assert_eq!(payload["justification"], "camera blocked");
    }

    #[test]
    fn test_alert_payload_shape() {
        let alert = AlertEvent::info("wrap", "Pallet was not wrapped", TS);
        assert_eq!(
            alert.to_payload(),
            serde_json::json!({
                "alert": true,
                "type": "info",
                "stage": "wrap",
                "message": "Pallet was not wrapped",
                "timestamp": TS,
            })
        );
    }

    #[test]
    fn test_step_event_roundtrip_without_justification() {
        let json = r#"{"stage":"a","step":"a","description":"d","passed":false,"skip":false,"timestamp":"t"}"#;
        let event: StepEvent = serde_json::from_str(json).unwrap();
        assert!(event.justification.is_none());
    }
}
