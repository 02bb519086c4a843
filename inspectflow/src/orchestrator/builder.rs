//! Orchestrator builder.

use std::sync::Arc;

use super::{Orchestrator, RunContext};
use crate::catalog::Catalog;
use crate::events::{EventSink, NoOpEventSink, StepPublisher};
use crate::persistence::{InMemoryRunStore, RunStore};
use crate::source::{FrameOutput, FrameSource, ManualFrameSource, NullFrameOutput};
use crate::stages::TrackerFactory;
use crate::utils::{Clock, SystemClock};
use crate::vision::{DetectorFactory, DEFAULT_FRAME_SIDE};

/// Builder for an [`Orchestrator`].
///
/// Only the catalog and the detector factory are required; every other
/// collaborator defaults to an inert implementation.
pub struct OrchestratorBuilder {
    catalog: Arc<Catalog>,
    detectors: Arc<dyn DetectorFactory>,
    source: Box<dyn FrameSource>,
    output: Arc<dyn FrameOutput>,
    store: Arc<dyn RunStore>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    context: RunContext,
    frame_side: u32,
}

impl OrchestratorBuilder {
    /// Creates a builder over `catalog`, loading detectors from `detectors`.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, detectors: Arc<dyn DetectorFactory>) -> Self {
        Self {
            catalog,
            detectors,
            source: Box::new(ManualFrameSource::new()),
            output: Arc::new(NullFrameOutput),
            store: Arc::new(InMemoryRunStore::new()),
            sink: Arc::new(NoOpEventSink),
            clock: Arc::new(SystemClock),
            context: RunContext::new(),
            frame_side: DEFAULT_FRAME_SIDE,
        }
    }

    /// Sets the frame source rebound at stage boundaries.
    #[must_use]
    pub fn with_source(mut self, source: impl FrameSource + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Sets the destination of annotated frames.
    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn FrameOutput>) -> Self {
        self.output = output;
        self
    }

    /// Sets the store the finished run is appended to.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = store;
        self
    }

    /// Sets the sink step results and alerts are published to.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the wall clock used for run times and event timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Shares `context` with external listeners.
    #[must_use]
    pub fn with_context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the side of the square frames are normalized to.
    #[must_use]
    pub fn with_frame_side(mut self, side: u32) -> Self {
        self.frame_side = side.max(1);
        self
    }

    /// Builds the orchestrator.
    #[must_use]
    pub fn build(self) -> Orchestrator {
        let publisher = StepPublisher::new(self.sink, self.clock.clone());
        Orchestrator {
            catalog: self.catalog,
            detectors: self.detectors,
            source: self.source,
            output: self.output,
            store: self.store,
            trackers: TrackerFactory::new(publisher.clone()),
            publisher,
            clock: self.clock,
            context: self.context,
            frame_side: self.frame_side,
            state: super::OrchestratorState::Idle,
            run: None,
            finished: None,
        }
    }
}
