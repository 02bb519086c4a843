//! Test fixtures: a sample catalog and frame/detection builders.

use std::sync::Arc;

use crate::events::{CollectingEventSink, StepPublisher};
use crate::utils::ManualClock;
use crate::vision::{BoundingBox, Detection, Frame, Roi};

/// A detection whose box sits in the middle of `roi`, half its size.
#[must_use]
pub fn detection_in(roi: &Roi, label: &str, confidence: f32) -> Detection {
    let (w, h) = (roi.width as f32, roi.height as f32);
    let (x, y) = (roi.x as f32, roi.y as f32);
    Detection {
        label: label.to_string(),
        confidence,
        bbox: BoundingBox::new(x + w / 4.0, y + h / 4.0, x + 3.0 * w / 4.0, y + 3.0 * h / 4.0),
    }
}

/// A pixel-less frame captured at `seconds`.
#[must_use]
pub fn frame_at(seconds: f64) -> Frame {
    Frame::empty("test", seconds)
}

/// A pixel-less frame from `source` captured at `seconds`.
#[must_use]
pub fn frame_from(source: &str, seconds: f64) -> Frame {
    Frame::empty(source, seconds)
}

/// A publisher into a fresh collecting sink, on a manual clock.
#[must_use]
pub fn collecting_publisher() -> (StepPublisher, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let publisher = StepPublisher::new(sink.clone(), Arc::new(ManualClock::default()));
    (publisher, sink)
}

/// Region watched by the arrival and unload stages.
pub const DOCK_ROI: Roi = Roi::new(375, 176, 205, 319);

/// Region watched by the finish stage.
pub const EXIT_ROI: Roi = Roi::new(177, 176, 201, 319);

/// A catalog of a loading-dock dispatch procedure.
///
/// `dispatch-standard` runs every stage; `dispatch-pulp` swaps the unload
/// stage for the load/unload cycle through a substitution;
/// `inspection-short` is arrival, garment and finish.
#[must_use]
pub fn sample_catalog_json() -> String {
    r#"{
  "stages": {
    "arrival": {
      "description": "Vehicle parked at the dock",
      "source": "dock",
      "detector_model": "people",
      "alert_message": "Vehicle did not reach the dock",
      "kind": "presence",
      "filter": {
        "roi": {"x": 375, "y": 176, "width": 205, "height": 319},
        "containment": "box",
        "labels": {"excluding": ["person"]},
        "min_confidence": 0.5
      },
      "required_continuous_seconds": 5,
      "timeout_seconds": 30
    },
    "garment": {
      "description": "Operator wears the expected garment",
      "source": "garment_cam",
      "detector_model": "garments",
      "alert_message": "Wrong garment",
      "kind": "presence",
      "filter": {"labels": {"expected": "garment"}, "min_confidence": 0.75},
      "required_continuous_seconds": 3,
      "timeout_seconds": 20,
      "exempt_value": "none"
    },
    "pallet": {
      "description": "Pallet checked",
      "source": "pallet_cam",
      "detector_model": "pallets",
      "kind": "color_then_class",
      "color_roi": {"x": 225, "y": 205, "width": 120, "height": 246},
      "expected_color_key": "pallet_color",
      "color": {
        "step": "pallet_color",
        "description": "Pallet colour matches",
        "required_continuous_seconds": 2,
        "timeout_seconds": 15,
        "alert_message": "Wrong pallet colour"
      },
      "class_filter": {
        "roi": {"x": 190, "y": 170, "width": 188, "height": 319},
        "containment": "center",
        "labels": {"expected": "pallet_class"},
        "min_confidence": 0.6
      },
      "class": {
        "step": "pallet_class",
        "description": "Pallet type matches",
        "required_continuous_seconds": 2,
        "timeout_seconds": 15,
        "alert_message": "Wrong pallet type"
      },
      "no_check_class": "none"
    },
    "unload": {
      "description": "Products unloaded",
      "source": "dock",
      "detector_model": "products",
      "alert_message": "Products still on the vehicle",
      "kind": "absence",
      "filter": {
        "roi": {"x": 375, "y": 176, "width": 205, "height": 319},
        "containment": "center",
        "labels": {"one_of": ["bucket", "box"]},
        "min_confidence": 0.55
      },
      "required_continuous_seconds": 5,
      "timeout_seconds": 60
    },
    "unload_cycle": {
      "description": "Products unloaded in two batches",
      "source": "dock",
      "detector_model": "products",
      "alert_message": "Unload took too long",
      "kind": "load_unload_cycle",
      "filter": {
        "roi": {"x": 375, "y": 176, "width": 205, "height": 319},
        "containment": "center",
        "labels": {"one_of": ["bucket", "box"]},
        "min_confidence": 0.55
      },
      "load_seconds": 3,
      "unload_seconds": 2,
      "ceiling_seconds": 120
    },
    "wrap": {
      "description": "Load wrapped in stretch film",
      "source": "wrap_cam",
      "detector_model": "wrap",
      "alert_message": "Load not wrapped",
      "kind": "presence",
      "filter": {"labels": {"one_of": ["stretch"]}, "min_confidence": 0.7},
      "required_continuous_seconds": 4,
      "timeout_seconds": 30
    },
    "label": {
      "description": "Shipping label applied",
      "source": "dock_top",
      "detector_model": "labels",
      "alert_message": "Shipping label missing",
      "kind": "presence",
      "filter": {"labels": {"one_of": ["label"]}, "min_confidence": 0.6},
      "required_continuous_seconds": 2,
      "timeout_seconds": 20
    },
    "finish": {
      "description": "Vehicle left the dock",
      "source": "dock",
      "detector_model": "people",
      "alert_message": "Vehicle did not leave",
      "kind": "departure",
      "filter": {
        "roi": {"x": 177, "y": 176, "width": 201, "height": 319},
        "containment": "box",
        "labels": {"one_of": ["truck"]},
        "min_confidence": 0.5
      },
      "required_continuous_seconds": 5,
      "timeout_seconds": 30
    }
  },
  "procedures": [
    {
      "id": "dispatch-standard",
      "stages": ["arrival", "garment", "pallet", "unload", "wrap", "label", "finish"],
      "expectations": {"garment": "white_coat", "pallet_color": "blue", "pallet_class": "pbr"}
    },
    {
      "id": "dispatch-pulp",
      "stages": ["arrival", "garment", "pallet", "unload", "wrap", "label", "finish"],
      "expectations": {"garment": "none", "pallet_color": "brown", "pallet_class": "none"}
    },
    {
      "id": "inspection-short",
      "stages": ["arrival", "garment", "finish"],
      "expectations": {"garment": "white_coat"}
    }
  ],
  "substitutions": [
    {"pattern": "pulp", "replace": "unload", "with": "unload_cycle"}
  ],
  "palette": {
    "white": [200, 205, 200],
    "blue": [180, 90, 30],
    "brown": [40, 70, 110]
  }
}"#
    .to_string()
}
