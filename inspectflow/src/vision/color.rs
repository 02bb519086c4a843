//! Dominant-colour classification against a named palette.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Frame, Roi};

/// A colour in blue-green-red channel order.
pub type Bgr = [u8; 3];

/// Named reference colours.
///
/// Ordered by name so that equidistant matches resolve deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Palette {
    colors: BTreeMap<String, Bgr>,
}

impl Palette {
    /// Creates an empty palette.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named colour.
    #[must_use]
    pub fn with_color(mut self, name: impl Into<String>, bgr: Bgr) -> Self {
        self.colors.insert(name.into(), bgr);
        self
    }

    /// Returns true when the palette defines `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.colors.contains_key(name)
    }

    /// Returns the number of colours.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Returns true if the palette is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Returns the palette entry closest to `bgr` by Euclidean distance.
    #[must_use]
    pub fn closest(&self, bgr: Bgr) -> Option<&str> {
        self.colors
            .iter()
            .map(|(name, reference)| (name, distance_sq(bgr, *reference)))
            .min_by_key(|(_, d)| *d)
            .map(|(name, _)| name.as_str())
    }

    /// Classifies the mean colour of `roi` in `frame`.
    ///
    /// Returns `None` for frames without pixels, regions outside the frame,
    /// or an empty palette.
    #[must_use]
    pub fn dominant_color(&self, frame: &Frame, roi: &Roi) -> Option<&str> {
        mean_color(frame, roi).and_then(|bgr| self.closest(bgr))
    }
}

fn distance_sq(a: Bgr, b: Bgr) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = i32::from(*x) - i32::from(*y);
            d.unsigned_abs() * d.unsigned_abs()
        })
        .sum()
}

/// Mean BGR value over a region, truncated to integers.
#[must_use]
pub fn mean_color(frame: &Frame, roi: &Roi) -> Option<Bgr> {
    if !frame.has_pixels() {
        return None;
    }
    let region = roi.clamp_to(frame.width(), frame.height())?;
    let mut sums = [0u64; 3];
    let mut count = 0u64;
    for y in region.y..region.y2() {
        for x in region.x..region.x2() {
            if let Some(px) = frame.pixel(x, y) {
                for (sum, channel) in sums.iter_mut().zip(px) {
                    *sum += u64::from(channel);
                }
                count += 1;
            }
        }
    }
    if count == 0 {
        return None;
    }
    let avg = |s: u64| u8::try_from(s / count).unwrap_or(u8::MAX);
    Some([avg(sums[0]), avg(sums[1]), avg(sums[2])])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> Palette {
        Palette::new()
            .with_color("orange", [50, 90, 210])
            .with_color("yellow", [10, 200, 220])
            .with_color("blue", [255, 0, 0])
            .with_color("empty", [146, 155, 153])
    }

    #[test]
    fn test_closest_color() {
        let p = palette();
        assert_eq!(p.closest([60, 95, 200]), Some("orange"));
        assert_eq!(p.closest([240, 10, 5]), Some("blue"));
        assert_eq!(Palette::new().closest([0, 0, 0]), None);
    }

    #[test]
    fn test_dominant_color_over_roi() {
        let frame = Frame::solid("cam", 0.0, 64, [12, 198, 219]);
        let roi = Roi::new(10, 10, 20, 20);
        assert_eq!(palette().dominant_color(&frame, &roi), Some("yellow"));
    }

    #[test]
    fn test_dominant_color_without_pixels() {
        let frame = Frame::empty("cam", 0.0);
        assert_eq!(palette().dominant_color(&frame, &Roi::new(0, 0, 10, 10)), None);
    }

    #[test]
    fn test_mean_color_clamps_roi() {
        let frame = Frame::solid("cam", 0.0, 16, [1, 2, 3]);
        assert_eq!(mean_color(&frame, &Roi::new(10, 10, 100, 100)), Some([1, 2, 3]));
        assert_eq!(mean_color(&frame, &Roi::new(20, 20, 5, 5)), None);
    }

    #[test]
    fn test_palette_deserializes_from_map() {
        let p: Palette = serde_json::from_str(r#"{"white": [200, 205, 200]}"#).unwrap();
        assert!(p.contains("white"));
        assert_eq!(p.len(), 1);
    }
}
