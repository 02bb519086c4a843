//! Stamps and publishes step results and alerts.

use std::sync::Arc;

use super::EventSink;
use crate::core::{AlertEvent, StepEvent, ALERTS_TOPIC, STEP_RESULTS_TOPIC};
use crate::utils::{iso_timestamp, Clock};

/// Publishes tracker outcomes without blocking the frame path.
#[derive(Clone)]
pub struct StepPublisher {
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl StepPublisher {
    /// Creates a publisher over `sink`, stamping with `clock`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    /// The current wall-clock time, formatted for payloads.
    #[must_use]
    pub fn timestamp(&self) -> String {
        iso_timestamp(self.clock.now())
    }

    /// Publishes a step result.
    pub fn step(&self, event: &StepEvent) {
        self.sink.try_emit(STEP_RESULTS_TOPIC, event.to_payload());
    }

    /// Publishes an alert for `stage`.
    pub fn alert(&self, stage: &str, message: &str) {
        let alert = AlertEvent::info(stage, message, self.timestamp());
        self.sink.try_emit(ALERTS_TOPIC, alert.to_payload());
    }
}

impl std::fmt::Debug for StepPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepPublisher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::utils::ManualClock;

    #[test]
    fn test_publishes_to_topics() {
        let sink = Arc::new(CollectingEventSink::new());
        let publisher = StepPublisher::new(sink.clone(), Arc::new(ManualClock::default()));

        let event = StepEvent::new("wrap", "wrap", "Pallet wrapped", false, publisher.timestamp());
        publisher.step(&event);
        publisher.alert("wrap", "Pallet was not wrapped");

        assert_eq!(sink.count(STEP_RESULTS_TOPIC), 1);
        let alerts = sink.on_topic(ALERTS_TOPIC);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["message"], "Pallet was not wrapped");
        assert_eq!(alerts[0]["timestamp"], "1970-01-01T00:00:00.000000+00:00");
    }
}
