//! Frames decorated for the streaming output.

use serde::Serialize;

use super::{BoundingBox, Frame, Roi};

/// Something a tracker wants drawn over the frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Overlay {
    /// A region of interest outline.
    Region {
        /// Caption.
        label: String,
        /// The region.
        roi: Roi,
    },
    /// A detection box.
    Detection {
        /// Class label.
        label: String,
        /// Confidence.
        confidence: f32,
        /// The box.
        bbox: BoundingBox,
    },
    /// Free status text.
    Text {
        /// The text.
        text: String,
    },
}

/// A processed frame plus its overlays.
///
/// Rendering is left to the consumer of the streaming output.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    /// The normalized frame.
    pub frame: Frame,
    /// Overlays in drawing order.
    pub overlays: Vec<Overlay>,
}

impl AnnotatedFrame {
    /// Wraps a frame with no overlays.
    #[must_use]
    pub fn bare(frame: Frame) -> Self {
        Self {
            frame,
            overlays: Vec::new(),
        }
    }

    /// Adds a region outline.
    pub fn region(&mut self, label: impl Into<String>, roi: Roi) {
        self.overlays.push(Overlay::Region {
            label: label.into(),
            roi,
        });
    }

    /// Adds a detection box.
    pub fn detection(&mut self, label: impl Into<String>, confidence: f32, bbox: BoundingBox) {
        self.overlays.push(Overlay::Detection {
            label: label.into(),
            confidence,
            bbox,
        });
    }

    /// Adds status text.
    pub fn text(&mut self, text: impl Into<String>) {
        self.overlays.push(Overlay::Text { text: text.into() });
    }

    /// Returns true when nothing was drawn.
    #[must_use]
    pub fn is_bare(&self) -> bool {
        self.overlays.is_empty()
    }
}
