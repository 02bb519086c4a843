//! Assertions over events collected by a [`CollectingEventSink`].

use crate::core::{ALERTS_TOPIC, STEP_RESULTS_TOPIC};
use crate::events::CollectingEventSink;

/// Returns `(step, passed)` for every step result, in publication order.
#[must_use]
pub fn step_results(sink: &CollectingEventSink) -> Vec<(String, bool)> {
    sink.on_topic(STEP_RESULTS_TOPIC)
        .iter()
        .map(|p| {
            (
                p["step"].as_str().unwrap_or_default().to_string(),
                p["passed"].as_bool().unwrap_or(false),
            )
        })
        .collect()
}

/// Asserts that exactly one step result was published for `step`, with
/// the expected verdict.
pub fn assert_step_published(sink: &CollectingEventSink, step: &str, passed: bool) {
    let matching: Vec<_> = step_results(sink)
        .into_iter()
        .filter(|(name, _)| name == step)
        .collect();
    assert_eq!(
        matching.len(),
        1,
        "Expected one step result for '{}', got {:?}",
        step,
        step_results(sink)
    );
    assert_eq!(
        matching[0].1, passed,
        "Expected step '{}' passed={}, got passed={}",
        step, passed, matching[0].1
    );
}

/// Asserts that exactly one alert was published for `stage`.
pub fn assert_alert_published(sink: &CollectingEventSink, stage: &str) {
    let alerts = sink.on_topic(ALERTS_TOPIC);
    let count = alerts.iter().filter(|a| a["stage"] == stage).count();
    assert_eq!(
        count, 1,
        "Expected one alert for stage '{}', got {:?}",
        stage, alerts
    );
}
