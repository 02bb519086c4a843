//! Frames delivered by a frame source.

use std::sync::Arc;

use crate::errors::SourceError;

/// Side of the square resolution all ROI coordinates are defined against.
pub const DEFAULT_FRAME_SIDE: u32 = 640;

/// A single frame, BGR24 pixels in row-major order.
///
/// `captured_at` is monotonic seconds since the source epoch; every timing
/// decision downstream is made on this clock, never on wall time.
#[derive(Clone)]
pub struct Frame {
    /// Identifier of the source that produced the frame.
    pub source_id: String,
    /// Capture time in monotonic seconds.
    pub captured_at: f64,
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
}

impl Frame {
    /// Creates a frame from raw BGR24 pixels.
    ///
    /// # Errors
    ///
    /// Returns an error when the buffer size does not match the dimensions.
    pub fn from_bgr(
        source_id: impl Into<String>,
        captured_at: f64,
        width: u32,
        height: u32,
        pixels: impl Into<Arc<[u8]>>,
    ) -> Result<Self, SourceError> {
        let source_id = source_id.into();
        let pixels = pixels.into();
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(SourceError::new(
                source_id,
                format!("frame buffer has {} bytes, expected {expected}", pixels.len()),
            ));
        }
        Ok(Self {
            source_id,
            captured_at,
            width,
            height,
            pixels,
        })
    }

    /// Creates a frame carrying no pixel data.
    ///
    /// Used when only detections matter (replay, tests). Colour
    /// classification on such a frame yields nothing.
    #[must_use]
    pub fn empty(source_id: impl Into<String>, captured_at: f64) -> Self {
        Self {
            source_id: source_id.into(),
            captured_at,
            width: DEFAULT_FRAME_SIDE,
            height: DEFAULT_FRAME_SIDE,
            pixels: Arc::from(Vec::new()),
        }
    }

    /// Creates a square frame filled with one colour.
    #[must_use]
    pub fn solid(source_id: impl Into<String>, captured_at: f64, side: u32, bgr: [u8; 3]) -> Self {
        let count = side as usize * side as usize;
        let pixels: Vec<u8> = std::iter::repeat(bgr).take(count).flatten().collect();
        Self {
            source_id: source_id.into(),
            captured_at,
            width: side,
            height: side,
            pixels: Arc::from(pixels),
        }
    }

    /// Frame width.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Frame height.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Returns true when the frame carries pixel data.
    #[must_use]
    pub fn has_pixels(&self) -> bool {
        !self.pixels.is_empty()
    }

    /// Returns the BGR value at a pixel, if in range.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if !self.has_pixels() || x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]])
    }

    /// Resamples to a `side`×`side` square with nearest-neighbour sampling.
    ///
    /// Frames already at that size are returned as a cheap clone.
    #[must_use]
    pub fn normalized(&self, side: u32) -> Self {
        if self.width == side && self.height == side {
            return self.clone();
        }
        if !self.has_pixels() || self.width == 0 || self.height == 0 {
            return Self {
                width: side,
                height: side,
                pixels: Arc::from(Vec::new()),
                ..self.clone()
            };
        }

        let mut out = Vec::with_capacity(side as usize * side as usize * 3);
        for y in 0..side {
            let sy = (u64::from(y) * u64::from(self.height) / u64::from(side)) as u32;
            for x in 0..side {
                let sx = (u64::from(x) * u64::from(self.width) / u64::from(side)) as u32;
                let idx = (sy as usize * self.width as usize + sx as usize) * 3;
                out.extend_from_slice(&self.pixels[idx..idx + 3]);
            }
        }
        Self {
            source_id: self.source_id.clone(),
            captured_at: self.captured_at,
            width: side,
            height: side,
            pixels: Arc::from(out),
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("source_id", &self.source_id)
            .field("captured_at", &self.captured_at)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bgr_rejects_bad_buffer() {
        let result = Frame::from_bgr("cam", 0.0, 2, 2, vec![0u8; 11]);
        assert!(result.is_err());
        assert!(Frame::from_bgr("cam", 0.0, 2, 2, vec![0u8; 12]).is_ok());
    }

    #[test]
    fn test_normalized_keeps_colour_and_metadata() {
        let frame = Frame::solid("cam", 3.5, 4, [10, 20, 30]);
        let norm = frame.normalized(8);
        assert_eq!(norm.width(), 8);
        assert_eq!(norm.height(), 8);
        assert_eq!(norm.captured_at, 3.5);
        assert_eq!(norm.pixel(7, 7), Some([10, 20, 30]));
    }

    #[test]
    fn test_normalized_samples_quadrants() {
        // 2x2: top-left red, others black
        let mut px = vec![0u8; 12];
        px[0..3].copy_from_slice(&[0, 0, 255]);
        let frame = Frame::from_bgr("cam", 0.0, 2, 2, px).unwrap();
        let norm = frame.normalized(4);
        assert_eq!(norm.pixel(0, 0), Some([0, 0, 255]));
        assert_eq!(norm.pixel(1, 1), Some([0, 0, 255]));
        assert_eq!(norm.pixel(2, 2), Some([0, 0, 0]));
    }

    #[test]
    fn test_empty_frame_has_no_pixels() {
        let frame = Frame::empty("cam", 1.0);
        assert!(!frame.has_pixels());
        assert_eq!(frame.pixel(0, 0), None);
        assert_eq!(frame.normalized(320).width(), 320);
    }
}
