//! Regions of interest and detection boxes.

use serde::{Deserialize, Serialize};

/// An axis-aligned detection box, corners in normalized frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x1: f32,
    /// Top edge.
    pub y1: f32,
    /// Right edge.
    pub x2: f32,
    /// Bottom edge.
    pub y2: f32,
}

impl BoundingBox {
    /// Creates a new bounding box.
    #[must_use]
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Returns the centre point.
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// A fixed rectangular sub-area of the normalized frame.
///
/// Stored as origin plus size, the way the catalog writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Roi {
    /// Creates a new region.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge. ROI checks are inclusive on both sides.
    #[must_use]
    pub const fn x2(&self) -> u32 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub const fn y2(&self) -> u32 {
        self.y + self.height
    }

    /// True when the whole box lies inside the region.
    #[must_use]
    pub fn contains_box(&self, bbox: &BoundingBox) -> bool {
        bbox.x1 >= self.x as f32
            && bbox.y1 >= self.y as f32
            && bbox.x2 <= self.x2() as f32
            && bbox.y2 <= self.y2() as f32
    }

    /// True when the box centre lies inside the region.
    #[must_use]
    pub fn contains_center(&self, bbox: &BoundingBox) -> bool {
        let (cx, cy) = bbox.center();
        cx >= self.x as f32 && cx <= self.x2() as f32 && cy >= self.y as f32 && cy <= self.y2() as f32
    }

    /// Clamps the region to a frame of the given size.
    ///
    /// Returns `None` when nothing of the region is inside the frame.
    #[must_use]
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(Self::new(self.x, self.y, w, h))
    }
}
