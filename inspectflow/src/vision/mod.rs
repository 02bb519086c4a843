//! Vision primitives shared by every stage tracker.
//!
//! This module provides:
//! - Frames normalized to a fixed square resolution
//! - Regions of interest and detection boxes in normalized coordinates
//! - Detection filtering by region, label and confidence
//! - Dominant-colour classification against a named palette
//! - The detector capability and its factory

mod annotate;
mod color;
mod detection;
mod detector;
mod frame;
mod geometry;

pub use annotate::{AnnotatedFrame, Overlay};
pub use color::{Bgr, Palette};
pub use detection::{Containment, Detection, DetectionFilter, LabelRule};
pub use detector::{Detector, DetectorFactory};
pub use frame::{Frame, DEFAULT_FRAME_SIDE};
pub use geometry::{BoundingBox, Roi};
