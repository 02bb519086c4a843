//! Message-bus publication.
//!
//! Sinks are handed to the orchestrator explicitly; there is no
//! process-wide sink.

mod backpressure;
mod publisher;
mod sink;

pub use backpressure::{BackpressureAwareEventSink, QueueMetrics};
pub use publisher::StepPublisher;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
