//! Bounded single-producer/single-consumer frame queue.
//!
//! The producer never waits: when the consumer falls behind, new frames are
//! dropped and counted. Stage completion is time-based, so a dropped frame
//! costs smoothness, never correctness.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::events::QueueMetrics;
use crate::vision::Frame;

/// Creates a queue holding at most `capacity` frames.
#[must_use]
pub fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let metrics = Arc::new(QueueMetrics::default());
    (
        FrameSender {
            tx,
            metrics: metrics.clone(),
        },
        FrameReceiver { rx, metrics },
    )
}

/// Producer half, owned by the frame source.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Frame>,
    metrics: Arc<QueueMetrics>,
}

impl FrameSender {
    /// Offers a frame. Returns false when it was dropped.
    pub fn try_push(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.metrics.record_accept();
                true
            }
            Err(_) => {
                self.metrics.record_drop();
                debug!(dropped_total = self.metrics.dropped(), "Frame dropped");
                false
            }
        }
    }

    /// Whether the consumer is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the run driver.
#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::Receiver<Frame>,
    metrics: Arc<QueueMetrics>,
}

impl FrameReceiver {
    /// Waits for the next frame; `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Takes a frame if one is ready.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Accepted/dropped counters.
    #[must_use]
    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drops_when_full() {
        let (tx, mut rx) = frame_queue(2);
        assert!(tx.try_push(Frame::empty("dock", 0.0)));
        assert!(tx.try_push(Frame::empty("dock", 0.1)));
        assert!(!tx.try_push(Frame::empty("dock", 0.2)));

        assert_eq!(rx.recv().await.map(|f| f.captured_at), Some(0.0));
        assert!(tx.try_push(Frame::empty("dock", 0.3)));
        assert_eq!(rx.metrics().accepted(), 3);
        assert_eq!(rx.metrics().dropped(), 1);
    }

    #[tokio::test]
    async fn test_closes_when_sender_dropped() {
        let (tx, mut rx) = frame_queue(1);
        tx.try_push(Frame::empty("dock", 0.0));
        drop(tx);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
