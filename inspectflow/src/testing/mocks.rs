//! Mock detectors and sources for testing.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::{DetectorError, SourceError};
use crate::source::FrameSource;
use crate::vision::{Detection, Detector, DetectorFactory, Frame};

/// A detector that replays queued results, one per call.
///
/// Once the queue is exhausted it returns the repeating result, or no
/// detections when none is set.
#[derive(Debug)]
pub struct ScriptedDetector {
    model: String,
    script: VecDeque<Result<Vec<Detection>, String>>,
    repeating: Vec<Detection>,
    calls: usize,
}

impl ScriptedDetector {
    /// Creates a detector with an empty script.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            script: VecDeque::new(),
            repeating: Vec::new(),
            calls: 0,
        }
    }

    /// Sets the result returned once the script runs out.
    #[must_use]
    pub fn repeating(mut self, detections: Vec<Detection>) -> Self {
        self.repeating = detections;
        self
    }

    /// Queues one successful result.
    pub fn push(&mut self, detections: Vec<Detection>) {
        self.script.push_back(Ok(detections));
    }

    /// Queues one inference failure.
    pub fn push_error(&mut self, reason: impl Into<String>) {
        self.script.push_back(Err(reason.into()));
    }

    /// Returns the number of `detect` calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Detector for ScriptedDetector {
    fn model(&self) -> &str {
        &self.model
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        self.calls += 1;
        match self.script.pop_front() {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(reason)) => Err(DetectorError::Inference(reason)),
            None => Ok(self.repeating.clone()),
        }
    }
}

/// What a [`CountingDetectorFactory`] sees: detections for a model at a
/// frame time.
pub type World = dyn Fn(&str, f64) -> Vec<Detection> + Send + Sync;

/// A detector factory that counts how many of its detectors are alive.
///
/// Detections come from a shared "world" function of model and frame time,
/// so scenario tests describe the scene once and every stage sees it
/// through its own model.
pub struct CountingDetectorFactory {
    world: Arc<World>,
    resident: Arc<AtomicUsize>,
    max_resident: Arc<AtomicUsize>,
    loads: Mutex<Vec<String>>,
    fail_model: Mutex<Option<String>>,
}

impl CountingDetectorFactory {
    /// Creates a factory backed by `world`.
    #[must_use]
    pub fn new(world: impl Fn(&str, f64) -> Vec<Detection> + Send + Sync + 'static) -> Self {
        Self {
            world: Arc::new(world),
            resident: Arc::new(AtomicUsize::new(0)),
            max_resident: Arc::new(AtomicUsize::new(0)),
            loads: Mutex::new(Vec::new()),
            fail_model: Mutex::new(None),
        }
    }

    /// Creates a factory whose detectors never see anything.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(|_, _| Vec::new())
    }

    /// Makes every later load of `model` fail.
    pub fn fail_model(&self, model: impl Into<String>) {
        *self.fail_model.lock() = Some(model.into());
    }

    /// Detectors currently alive.
    #[must_use]
    pub fn resident(&self) -> usize {
        self.resident.load(Ordering::SeqCst)
    }

    /// Highest number of detectors alive at once.
    #[must_use]
    pub fn max_resident(&self) -> usize {
        self.max_resident.load(Ordering::SeqCst)
    }

    /// Models loaded so far, in order.
    #[must_use]
    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().clone()
    }
}

impl fmt::Debug for CountingDetectorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingDetectorFactory")
            .field("resident", &self.resident())
            .field("max_resident", &self.max_resident())
            .field("loads", &self.loads())
            .finish_non_exhaustive()
    }
}

impl DetectorFactory for CountingDetectorFactory {
    fn load(&self, model: &str) -> Result<Box<dyn Detector>, DetectorError> {
        if self.fail_model.lock().as_deref() == Some(model) {
            return Err(DetectorError::Load {
                model: model.to_string(),
                reason: "weights not found".to_string(),
            });
        }
        self.loads.lock().push(model.to_string());
        let now = self.resident.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_resident.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(CountingDetector {
            model: model.to_string(),
            world: self.world.clone(),
            resident: self.resident.clone(),
        }))
    }
}

struct CountingDetector {
    model: String,
    world: Arc<World>,
    resident: Arc<AtomicUsize>,
}

impl Detector for CountingDetector {
    fn model(&self) -> &str {
        &self.model
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        Ok((self.world)(&self.model, frame.captured_at))
    }
}

impl Drop for CountingDetector {
    fn drop(&mut self) {
        self.resident.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One call observed by a [`RecordingFrameSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    /// `start(source_id)`.
    Start(String),
    /// `stop()`.
    Stop,
}

/// A frame source that records every start and stop.
///
/// Clones share the same record, so a test can keep one handle while the
/// orchestrator owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingFrameSource {
    calls: Arc<Mutex<Vec<SourceCall>>>,
    current: Option<String>,
    refuse: Option<String>,
}

impl RecordingFrameSource {
    /// Creates a new recording source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `start(source_id)` fail for the given source.
    #[must_use]
    pub fn refusing(mut self, source_id: impl Into<String>) -> Self {
        self.refuse = Some(source_id.into());
        self
    }

    /// Returns the recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().clone()
    }

    /// The source a frame producer would currently read, replayed from the
    /// recorded calls. Refused starts leave the binding unchanged.
    #[must_use]
    pub fn bound(&self) -> Option<String> {
        self.calls.lock().iter().fold(None, |bound, call| match call {
            SourceCall::Start(id) if self.refuse.as_deref() == Some(id.as_str()) => bound,
            SourceCall::Start(id) => Some(id.clone()),
            SourceCall::Stop => None,
        })
    }

    /// Returns the sources started, in order.
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                SourceCall::Start(id) => Some(id.clone()),
                SourceCall::Stop => None,
            })
            .collect()
    }
}

impl FrameSource for RecordingFrameSource {
    fn start(&mut self, source_id: &str) -> Result<(), SourceError> {
        self.calls.lock().push(SourceCall::Start(source_id.to_string()));
        if self.refuse.as_deref() == Some(source_id) {
            return Err(SourceError::new(source_id, "connection refused"));
        }
        self.current = Some(source_id.to_string());
        Ok(())
    }

    fn stop(&mut self) {
        self.calls.lock().push(SourceCall::Stop);
        self.current = None;
    }

    fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}
