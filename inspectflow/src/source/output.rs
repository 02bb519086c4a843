//! Streaming surface for annotated frames.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::events::QueueMetrics;
use crate::vision::AnnotatedFrame;

/// Receives annotated frames for display. Must not block.
pub trait FrameOutput: Send + Sync {
    /// Offers a frame.
    fn send(&self, frame: AnnotatedFrame);
}

/// Discards frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFrameOutput;

impl FrameOutput for NullFrameOutput {
    fn send(&self, _frame: AnnotatedFrame) {}
}

/// Hands frames to a streaming task over a bounded queue, dropping when the
/// viewer falls behind.
#[derive(Debug)]
pub struct QueuedFrameOutput {
    tx: mpsc::Sender<AnnotatedFrame>,
    metrics: Arc<QueueMetrics>,
}

impl QueuedFrameOutput {
    /// Creates the output and the receiver the streaming task reads.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AnnotatedFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                metrics: Arc::new(QueueMetrics::default()),
            },
            rx,
        )
    }

    /// Accepted/dropped counters.
    #[must_use]
    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }
}

impl FrameOutput for QueuedFrameOutput {
    fn send(&self, frame: AnnotatedFrame) {
        if self.tx.try_send(frame).is_ok() {
            self.metrics.record_accept();
        } else {
            self.metrics.record_drop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::Frame;

    #[test]
    fn test_queued_output_drops_when_full() {
        let (output, mut rx) = QueuedFrameOutput::new(1);
        output.send(AnnotatedFrame::bare(Frame::empty("dock", 0.0)));
        output.send(AnnotatedFrame::bare(Frame::empty("dock", 0.5)));

        assert_eq!(output.metrics().accepted(), 1);
        assert_eq!(output.metrics().dropped(), 1);
        assert_eq!(rx.try_recv().map(|f| f.frame.captured_at).ok(), Some(0.0));
    }

    #[test]
    fn test_null_output() {
        NullFrameOutput.send(AnnotatedFrame::bare(Frame::empty("dock", 0.0)));
    }
}
