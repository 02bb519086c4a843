//! Offline replay of recorded detections through the orchestrator.
//!
//! A script is JSON lines, one per frame:
//! `{"source": "dock", "t": 12.5, "detections": [...], "bgr": [b, g, r]}`.
//! `bgr` is optional and paints the whole frame for colour stages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::{DetectorError, InspectflowError};
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::vision::{Bgr, Detection, Detector, DetectorFactory, Frame};

/// One recorded frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptLine {
    /// Source the frame came from.
    pub source: String,
    /// Capture time in seconds.
    pub t: f64,
    /// What the detector reported for this frame.
    #[serde(default)]
    pub detections: Vec<Detection>,
    /// Uniform frame colour, when the frame carries pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgr: Option<Bgr>,
}

impl ScriptLine {
    /// Builds the frame this line stands for.
    #[must_use]
    pub fn frame(&self, side: u32) -> Frame {
        match self.bgr {
            Some(bgr) => Frame::solid(&self.source, self.t, side, bgr),
            None => Frame::empty(&self.source, self.t),
        }
    }
}

/// A parsed script, in time order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayScript {
    lines: Vec<ScriptLine>,
}

impl ReplayScript {
    /// Parses JSON lines, skipping blank lines and `#` comments.
    ///
    /// # Errors
    ///
    /// Returns a serialization error naming the offending line.
    pub fn parse(text: &str) -> Result<Self, InspectflowError> {
        let mut lines = Vec::new();
        for (number, raw) in text.lines().enumerate() {
            let raw = raw.trim();
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }
            let line: ScriptLine = serde_json::from_str(raw)
                .map_err(|e| InspectflowError::Serialization(format!("line {}: {e}", number + 1)))?;
            lines.push(line);
        }
        lines.sort_by(|a, b| a.t.total_cmp(&b.t));
        Ok(Self { lines })
    }

    /// The lines, in time order.
    #[must_use]
    pub fn lines(&self) -> &[ScriptLine] {
        &self.lines
    }

    /// Detector factory that answers each frame with its recorded
    /// detections.
    #[must_use]
    pub fn detectors(&self) -> ReplayDetectorFactory {
        let scene = self
            .lines
            .iter()
            .map(|l| ((l.source.clone(), l.t.to_bits()), l.detections.clone()))
            .collect();
        ReplayDetectorFactory {
            scene: Arc::new(scene),
        }
    }
}

/// Recorded detections by source and capture time bits.
type Scene = HashMap<(String, u64), Vec<Detection>>;

/// Serves recorded detections keyed by frame source and capture time.
#[derive(Debug, Clone)]
pub struct ReplayDetectorFactory {
    scene: Arc<Scene>,
}

impl DetectorFactory for ReplayDetectorFactory {
    fn load(&self, model: &str) -> Result<Box<dyn Detector>, DetectorError> {
        debug!(model, "Replay detector loaded");
        Ok(Box::new(ReplayDetector {
            model: model.to_string(),
            scene: self.scene.clone(),
        }))
    }
}

struct ReplayDetector {
    model: String,
    scene: Arc<Scene>,
}

impl Detector for ReplayDetector {
    fn model(&self) -> &str {
        &self.model
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        Ok(self
            .scene
            .get(&(frame.source_id.clone(), frame.captured_at.to_bits()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Operator actions injected at script times.
#[derive(Debug, Clone, Default)]
pub struct ReplayControls {
    /// Request cancellation before the first frame at or after this time.
    pub cancel_at: Option<f64>,
    /// Skip the active step before the first frame at or after each time.
    pub skips: Vec<(f64, String)>,
}

/// Feeds `script` to an already started orchestrator.
///
/// Returns the outcome, closing the run out at the end of the script.
pub fn replay(
    orchestrator: &mut Orchestrator,
    script: &ReplayScript,
    controls: &ReplayControls,
    frame_side: u32,
) -> Option<RunOutcome> {
    let mut skips = controls.skips.clone();
    skips.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut skips = skips.into_iter().peekable();

    for line in script.lines() {
        if controls.cancel_at.is_some_and(|at| line.t >= at) {
            orchestrator.cancel("replay cancel");
        }
        while let Some((_, justification)) = skips.next_if(|(at, _)| line.t >= *at) {
            if !orchestrator.skip(&justification) {
                info!(t = line.t, "Replay skip ignored: no active step");
            }
        }
        if let Some(outcome) = orchestrator.on_frame(line.frame(frame_side)) {
            return Some(outcome);
        }
    }
    orchestrator.end_of_stream()
}
