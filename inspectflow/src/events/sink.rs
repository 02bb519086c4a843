//! Message-bus sink trait and in-process implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Publishes payloads to message-bus topics.
///
/// Delivery is at-least-once from the consumer's point of view; the core
/// performs no deduplication.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes a payload, waiting for queue capacity if the sink has any.
    async fn emit(&self, topic: &str, payload: serde_json::Value);

    /// Publishes without blocking. Failures are logged and dropped.
    fn try_emit(&self, topic: &str, payload: serde_json::Value);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _topic: &str, _payload: serde_json::Value) {}

    fn try_emit(&self, _topic: &str, _payload: serde_json::Value) {}
}

/// Mirrors published payloads into the tracing log.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log(&self, topic: &str, payload: &serde_json::Value) {
        if self.level == Level::DEBUG {
            debug!(topic = %topic, payload = %payload, "Published to {}", topic);
        } else {
            info!(topic = %topic, payload = %payload, "Published to {}", topic);
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, topic: &str, payload: serde_json::Value) {
        self.log(topic, &payload);
    }

    fn try_emit(&self, topic: &str, payload: serde_json::Value) {
        self.log(topic, &payload);
    }
}

/// Keeps every published payload in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    published: RwLock<Vec<(String, serde_json::Value)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(topic, payload)` pair in publication order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.read().clone()
    }

    /// Payloads published to `topic`, in order.
    #[must_use]
    pub fn on_topic(&self, topic: &str) -> Vec<serde_json::Value> {
        self.published
            .read()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Number of payloads published to `topic`.
    #[must_use]
    pub fn count(&self, topic: &str) -> usize {
        self.published.read().iter().filter(|(t, _)| t == topic).count()
    }

    /// Total number of payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.published.read().len()
    }

    /// Returns true if nothing was published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.published.read().is_empty()
    }

    /// Forgets everything.
    pub fn clear(&self) {
        self.published.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, topic: &str, payload: serde_json::Value) {
        self.try_emit(topic, payload);
    }

    fn try_emit(&self, topic: &str, payload: serde_json::Value) {
        self.published.write().push((topic.to_string(), payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_and_logging_sinks_accept_payloads() {
        NoOpEventSink.emit("alerts", json!({})).await;
        NoOpEventSink.try_emit("alerts", json!({}));

        let sink = LoggingEventSink::debug();
        sink.emit("step-results", json!({"stage": "arrival"})).await;
        LoggingEventSink::default().try_emit("alerts", json!({"alert": true}));
    }

    #[test]
    fn test_collecting_sink_by_topic() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        tokio_test::block_on(sink.emit("step-results", json!({"stage": "a"})));
        sink.try_emit("alerts", json!({"stage": "b"}));
        sink.try_emit("step-results", json!({"stage": "b"}));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count("step-results"), 2);
        assert_eq!(sink.on_topic("alerts"), vec![json!({"stage": "b"})]);
        assert_eq!(sink.published()[0].0, "step-results");

        sink.clear();
        assert!(sink.is_empty());
    }
}
