//! Serde schema of the stage catalog.
//!
//! Every field is data; nothing in the catalog is evaluated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::vision::{DetectionFilter, Palette, Roi};

/// Parameters of a single-gate stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinglePhaseParams {
    /// Reduces detections to the gate signal.
    #[serde(default)]
    pub filter: DetectionFilter,
    /// Seconds the criterion must hold continuously.
    pub required_continuous_seconds: f64,
    /// Seconds before the stage fails. For departure stages this bounds
    /// only the wait for the initial detection.
    pub timeout_seconds: f64,
    /// Expectation value that exempts the stage from checking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exempt_value: Option<String>,
}

/// One phase of a multi-phase stage that reports its own step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Step name published for this phase.
    pub step: String,
    /// Operator-facing description.
    #[serde(default)]
    pub description: String,
    /// Seconds the criterion must hold continuously.
    pub required_continuous_seconds: f64,
    /// Seconds before the phase fails.
    pub timeout_seconds: f64,
    /// Alert text on timeout.
    #[serde(default)]
    pub alert_message: String,
}

/// Parameters of a colour-then-class stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorThenClassParams {
    /// Region whose dominant colour is classified.
    pub color_roi: Roi,
    /// Expectation key holding the expected palette colour.
    pub expected_color_key: String,
    /// Colour phase.
    pub color: PhaseSpec,
    /// Detection filter of the class phase, usually with an expected label.
    pub class_filter: DetectionFilter,
    /// Class phase.
    pub class: PhaseSpec,
    /// Expected class value that skips the class phase entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_check_class: Option<String>,
    /// Palette colour that also counts as class presence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_color_fallback: Option<String>,
}

/// Parameters of a load/unload cycle stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadUnloadParams {
    /// Detections that count as load present.
    #[serde(default)]
    pub filter: DetectionFilter,
    /// Continuous presence required by each load phase.
    pub load_seconds: f64,
    /// Continuous absence required by each unload phase.
    pub unload_seconds: f64,
    /// Overall ceiling across all four phases.
    pub ceiling_seconds: f64,
}

/// Stage shape, tagged by `kind` in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageKind {
    /// Continuous presence of matching detections.
    Presence(SinglePhaseParams),
    /// Continuous absence of matching detections.
    Absence(SinglePhaseParams),
    /// An initial detection followed by continuous absence.
    Departure(SinglePhaseParams),
    /// Dominant colour, then class presence.
    ColorThenClass(ColorThenClassParams),
    /// Load, unload, load, unload.
    LoadUnloadCycle(LoadUnloadParams),
}

impl StageKind {
    /// Catalog tag of the kind.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Presence(_) => "presence",
            Self::Absence(_) => "absence",
            Self::Departure(_) => "departure",
            Self::ColorThenClass(_) => "color_then_class",
            Self::LoadUnloadCycle(_) => "load_unload_cycle",
        }
    }

    /// Every `(label, required, limit)` pair the catalog validates.
    pub(crate) fn timings(&self) -> Vec<(&'static str, f64, f64)> {
        match self {
            Self::Presence(p) | Self::Absence(p) | Self::Departure(p) => {
                vec![("stage", p.required_continuous_seconds, p.timeout_seconds)]
            }
            Self::ColorThenClass(p) => vec![
                ("color phase", p.color.required_continuous_seconds, p.color.timeout_seconds),
                ("class phase", p.class.required_continuous_seconds, p.class.timeout_seconds),
            ],
            Self::LoadUnloadCycle(p) => vec![
                ("load phase", p.load_seconds, p.ceiling_seconds),
                ("unload phase", p.unload_seconds, p.ceiling_seconds),
            ],
        }
    }

    /// Procedure expectation keys this stage reads.
    pub(crate) fn expectation_keys(&self) -> Vec<&str> {
        match self {
            Self::Presence(p) | Self::Absence(p) | Self::Departure(p) => {
                p.filter.labels.expectation_key().into_iter().collect()
            }
            Self::ColorThenClass(p) => std::iter::once(p.expected_color_key.as_str())
                .chain(p.class_filter.labels.expectation_key())
                .collect(),
            Self::LoadUnloadCycle(p) => p.filter.labels.expectation_key().into_iter().collect(),
        }
    }
}

/// One stage of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Stage name; filled from the catalog key.
    #[serde(default)]
    pub name: String,
    /// Operator-facing description of the step.
    #[serde(default)]
    pub description: String,
    /// Frame source this stage watches.
    pub source: String,
    /// Detector model loaded while the stage is active.
    pub detector_model: String,
    /// Alert text on timeout.
    #[serde(default)]
    pub alert_message: String,
    /// Shape and parameters.
    #[serde(flatten)]
    pub kind: StageKind,
}

/// An ordered procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureDefinition {
    /// Procedure identifier.
    pub id: String,
    /// Stage names in execution order.
    pub stages: Vec<String>,
    /// Values stages compare against, such as the expected garment.
    #[serde(default)]
    pub expectations: BTreeMap<String, String>,
}

/// Swaps one stage for another in procedures whose id matches `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    /// Regular expression matched against the procedure id.
    pub pattern: String,
    /// Stage to replace.
    pub replace: String,
    /// Replacement stage.
    pub with: String,
}

/// The catalog as written on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// Stages by name.
    pub stages: BTreeMap<String, StageDefinition>,
    /// Procedures.
    pub procedures: Vec<ProcedureDefinition>,
    /// Stage substitutions, applied in order.
    #[serde(default)]
    pub substitutions: Vec<Substitution>,
    /// Reference colours.
    #[serde(default)]
    pub palette: Palette,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::LabelRule;

    #[test]
    fn test_stage_kind_is_tagged_inline() {
        let json = r#"{
            "description": "Operator wears the expected garment",
            "source": "dock",
            "detector_model": "garments",
            "alert_message": "Wrong garment",
            "kind": "presence",
            "filter": {"labels": {"expected": "garment"}, "min_confidence": 0.75},
            "required_continuous_seconds": 3,
            "timeout_seconds": 20,
            "exempt_value": "none"
        }"#;
        let def: StageDefinition = serde_json::from_str(json).unwrap();
        let StageKind::Presence(params) = &def.kind else {
            panic!("expected presence, got {}", def.kind.tag());
        };
        assert_eq!(params.filter.labels, LabelRule::Expected("garment".into()));
        assert_eq!(params.exempt_value.as_deref(), Some("none"));
        assert_eq!(def.kind.expectation_keys(), vec!["garment"]);
    }

    #[test]
    fn test_color_then_class_keys() {
        let json = r#"{
            "source": "dock",
            "detector_model": "pallets",
            "kind": "color_then_class",
            "color_roi": {"x": 225, "y": 205, "width": 120, "height": 246},
            "expected_color_key": "pallet_color",
            "color": {"step": "pallet_color", "required_continuous_seconds": 2, "timeout_seconds": 15},
            "class_filter": {"labels": {"expected": "pallet_class"}},
            "class": {"step": "pallet_class", "required_continuous_seconds": 2, "timeout_seconds": 15},
            "no_check_class": "none"
        }"#;
        let def: StageDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.kind.tag(), "color_then_class");
        assert_eq!(def.kind.expectation_keys(), vec!["pallet_color", "pallet_class"]);
        assert_eq!(def.kind.timings().len(), 2);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"source": "a", "detector_model": "m", "kind": "script", "expr": "1+1"}"#;
        assert!(serde_json::from_str::<StageDefinition>(json).is_err());
    }
}
