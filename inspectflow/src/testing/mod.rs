//! Testing utilities for inspectflow.
//!
//! This module provides:
//! - Scripted and counting detectors
//! - A recording frame source
//! - A sample catalog and frame builders
//! - Assertions over published events

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_alert_published, assert_step_published, step_results};
pub use fixtures::{
    collecting_publisher, detection_in, frame_at, frame_from, sample_catalog_json, DOCK_ROI, EXIT_ROI,
};
pub use mocks::{
    CountingDetectorFactory, RecordingFrameSource, ScriptedDetector, SourceCall, World,
};
