//! Detector output and the filters stages apply to it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{BoundingBox, Roi};

/// A single object reported by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label.
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Box in normalized frame coordinates.
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

impl Detection {
    /// Creates a new detection.
    #[must_use]
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Which labels a filter accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LabelRule {
    /// Every label.
    #[default]
    Any,
    /// Exactly one of the listed labels.
    OneOf(Vec<String>),
    /// Every label except those containing one of the listed fragments.
    Excluding(Vec<String>),
    /// Labels containing the fragment.
    Contains(String),
    /// The value of a procedure expectation; resolved when a run starts.
    Expected(String),
}

impl LabelRule {
    /// Returns true when `label` is accepted.
    ///
    /// An unresolved `Expected` rule accepts nothing.
    #[must_use]
    pub fn accepts(&self, label: &str) -> bool {
        match self {
            Self::Any => true,
            Self::OneOf(labels) => labels.iter().any(|l| l == label),
            Self::Excluding(fragments) => !fragments.iter().any(|f| label.contains(f.as_str())),
            Self::Contains(fragment) => label.contains(fragment.as_str()),
            Self::Expected(_) => false,
        }
    }

    /// The expectation key this rule depends on, if any.
    #[must_use]
    pub fn expectation_key(&self) -> Option<&str> {
        match self {
            Self::Expected(key) => Some(key),
            _ => None,
        }
    }

    /// Replaces an `Expected` rule with the concrete value.
    ///
    /// # Errors
    ///
    /// Returns the missing key when the expectation is absent.
    pub fn resolve(&self, expectations: &BTreeMap<String, String>) -> Result<Self, String> {
        match self {
            Self::Expected(key) => expectations
                .get(key)
                .map(|value| Self::OneOf(vec![value.clone()]))
                .ok_or_else(|| key.clone()),
            other => Ok(other.clone()),
        }
    }
}

/// How a box must relate to the region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Containment {
    /// The whole box inside the region.
    #[default]
    Box,
    /// The box centre inside the region.
    Center,
}

/// Reduces a frame's detections to the boolean signal a gate consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DetectionFilter {
    /// Region detections must fall in; the whole frame when absent.
    #[serde(default)]
    pub roi: Option<Roi>,
    /// Containment test against the region.
    #[serde(default)]
    pub containment: Containment,
    /// Accepted labels.
    #[serde(default)]
    pub labels: LabelRule,
    /// Minimum confidence.
    #[serde(default)]
    pub min_confidence: f32,
}

impl DetectionFilter {
    /// Creates a filter that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the filter to a region.
    #[must_use]
    pub fn with_roi(mut self, roi: Roi, containment: Containment) -> Self {
        self.roi = Some(roi);
        self.containment = containment;
        self
    }

    /// Sets the label rule.
    #[must_use]
    pub fn with_labels(mut self, labels: LabelRule) -> Self {
        self.labels = labels;
        self
    }

    /// Sets the minimum confidence.
    #[must_use]
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Returns true when the detection passes every criterion.
    #[must_use]
    pub fn matches(&self, detection: &Detection) -> bool {
        if detection.confidence < self.min_confidence || !self.labels.accepts(&detection.label) {
            return false;
        }
        match (&self.roi, self.containment) {
            (None, _) => true,
            (Some(roi), Containment::Box) => roi.contains_box(&detection.bbox),
            (Some(roi), Containment::Center) => roi.contains_center(&detection.bbox),
        }
    }

    /// Returns true when at least one detection matches.
    #[must_use]
    pub fn any_match(&self, detections: &[Detection]) -> bool {
        detections.iter().any(|d| self.matches(d))
    }

    /// Returns the matching detections.
    pub fn matching<'a>(&'a self, detections: &'a [Detection]) -> impl Iterator<Item = &'a Detection> + 'a {
        detections.iter().filter(move |d| self.matches(d))
    }

    /// Resolves an expectation-dependent label rule.
    ///
    /// # Errors
    ///
    /// Returns the missing expectation key.
    pub fn resolve(&self, expectations: &BTreeMap<String, String>) -> Result<Self, String> {
        Ok(Self {
            labels: self.labels.resolve(expectations)?,
            ..self.clone()
        })
    }
}
