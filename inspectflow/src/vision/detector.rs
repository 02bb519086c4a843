//! The detector capability.
//!
//! Detectors are expensive (a loaded model, often GPU memory), so the
//! orchestrator keeps at most one resident and hands it to the active
//! stage tracker by mutable reference.

use crate::errors::DetectorError;

use super::{Detection, Frame};

/// Object detector invoked synchronously once per frame.
pub trait Detector: Send {
    /// The model this detector was loaded from.
    fn model(&self) -> &str;

    /// Runs detection on a normalized frame.
    ///
    /// # Errors
    ///
    /// Returns an error when inference fails for this frame. Callers treat
    /// that as a missed observation.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError>;
}

/// Loads detectors by model identifier.
pub trait DetectorFactory: Send + Sync {
    /// Loads a detector for `model`.
    ///
    /// # Errors
    ///
    /// Returns an error when the model cannot be loaded.
    fn load(&self, model: &str) -> Result<Box<dyn Detector>, DetectorError>;
}
