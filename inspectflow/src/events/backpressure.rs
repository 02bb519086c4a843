//! Bounded fire-and-forget publication.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::EventSink;

/// Accepted/dropped counters for a bounded queue.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl QueueMetrics {
    /// Records an item that entered the queue.
    pub fn record_accept(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an item dropped because the queue was full or closed.
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Items accepted so far.
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Items dropped so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Dropped share of all offered items, in percent.
    #[must_use]
    pub fn drop_rate(&self) -> f64 {
        let accepted = self.accepted();
        let dropped = self.dropped();
        let total = accepted + dropped;
        if total == 0 {
            0.0
        } else {
            (dropped as f64 / total as f64) * 100.0
        }
    }

    /// Renders the counters for logs and run summaries.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "accepted": self.accepted(),
            "dropped": self.dropped(),
            "drop_rate_percent": (self.drop_rate() * 100.0).round() / 100.0
        })
    }
}

struct Message {
    topic: String,
    payload: serde_json::Value,
}

/// Queues payloads for a downstream sink and publishes them from a
/// background task, so a slow bus never stalls frame processing.
///
/// `try_emit` drops the payload when the queue is full.
pub struct BackpressureAwareEventSink {
    tx: mpsc::Sender<Message>,
    rx: Mutex<Option<mpsc::Receiver<Message>>>,
    downstream: Arc<dyn EventSink>,
    capacity: usize,
    metrics: Arc<QueueMetrics>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackpressureAwareEventSink {
    /// Creates a sink in front of `downstream` holding at most `capacity`
    /// pending payloads.
    #[must_use]
    pub fn new(downstream: Arc<dyn EventSink>, capacity: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Arc::new(Self {
            tx,
            rx: Mutex::new(Some(rx)),
            downstream,
            capacity: capacity.max(1),
            metrics: Arc::new(QueueMetrics::default()),
            worker: Mutex::new(None),
        })
    }

    /// Spawns the publishing task. Later calls are no-ops.
    pub fn start(self: &Arc<Self>) {
        let Some(mut rx) = self.rx.lock().take() else {
            return;
        };
        let downstream = self.downstream.clone();
        let handle = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                downstream.emit(&msg.topic, msg.payload).await;
            }
            debug!("Event publisher stopped");
        });
        *self.worker.lock() = Some(handle);
    }

    /// Waits up to `grace` for queued payloads to go out, then stops the
    /// publishing task.
    pub async fn shutdown(&self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        while self.pending() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Payloads waiting in the queue.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// Whether the publishing task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Queue counters.
    #[must_use]
    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }
}

#[async_trait]
impl EventSink for BackpressureAwareEventSink {
    async fn emit(&self, topic: &str, payload: serde_json::Value) {
        let msg = Message {
            topic: topic.to_string(),
            payload,
        };
        if self.tx.send(msg).await.is_ok() {
            self.metrics.record_accept();
        } else {
            self.metrics.record_drop();
        }
    }

    fn try_emit(&self, topic: &str, payload: serde_json::Value) {
        let msg = Message {
            topic: topic.to_string(),
            payload,
        };
        match self.tx.try_send(msg) {
            Ok(()) => self.metrics.record_accept(),
            Err(_) => {
                self.metrics.record_drop();
                warn!(
                    topic = %topic,
                    pending = self.pending(),
                    dropped_total = self.metrics.dropped(),
                    "Event dropped due to backpressure"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use serde_json::json;

    #[test]
    fn test_metrics_drop_rate() {
        let metrics = QueueMetrics::default();
        assert_eq!(metrics.drop_rate(), 0.0);
        metrics.record_accept();
        metrics.record_accept();
        metrics.record_accept();
        metrics.record_drop();
        assert_eq!(metrics.drop_rate(), 25.0);
        assert_eq!(metrics.to_json()["dropped"], 1);
    }

    #[tokio::test]
    async fn test_try_emit_drops_when_full() {
        let downstream = Arc::new(CollectingEventSink::new());
        let sink = BackpressureAwareEventSink::new(downstream.clone(), 2);

        sink.try_emit("alerts", json!(1));
        sink.try_emit("alerts", json!(2));
        sink.try_emit("alerts", json!(3));

        assert_eq!(sink.metrics().accepted(), 2);
        assert_eq!(sink.metrics().dropped(), 1);
        assert_eq!(sink.pending(), 2);
        assert!(downstream.is_empty());
    }

    #[tokio::test]
    async fn test_worker_forwards_in_order() {
        let downstream = Arc::new(CollectingEventSink::new());
        let sink = BackpressureAwareEventSink::new(downstream.clone(), 8);
        sink.start();
        assert!(sink.is_running());

        sink.try_emit("step-results", json!({"n": 1}));
        sink.emit("alerts", json!({"n": 2})).await;
        sink.shutdown(Duration::from_secs(1)).await;

        assert_eq!(downstream.on_topic("step-results"), vec![json!({"n": 1})]);
        assert_eq!(downstream.on_topic("alerts"), vec![json!({"n": 2})]);
        assert!(!sink.is_running());
    }
}
