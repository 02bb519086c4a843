//! Stage catalog: load, validate once, resolve procedures at start.

mod config;
mod definitions;

pub use config::RuntimeConfig;
pub use definitions::{
    CatalogDocument, ColorThenClassParams, LoadUnloadParams, PhaseSpec, ProcedureDefinition,
    SinglePhaseParams, StageDefinition, StageKind, Substitution,
};

use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::{ConfigurationError, InspectflowError};
use crate::vision::Palette;

#[derive(Debug, Clone)]
struct CompiledSubstitution {
    pattern: Regex,
    replace: String,
    with: String,
}

/// A validated, immutable stage catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    stages: BTreeMap<String, Arc<StageDefinition>>,
    procedures: BTreeMap<String, ProcedureDefinition>,
    substitutions: Vec<CompiledSubstitution>,
    palette: Arc<Palette>,
}

/// A procedure with substitutions applied, ready to run.
#[derive(Debug, Clone)]
pub struct ResolvedProcedure {
    /// Procedure identifier.
    pub id: String,
    /// Stage definitions in execution order.
    pub stages: Vec<Arc<StageDefinition>>,
    /// Expectation values.
    pub expectations: BTreeMap<String, String>,
    /// Reference colours.
    pub palette: Arc<Palette>,
}

impl ResolvedProcedure {
    /// Stage names in execution order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.stages.iter().map(|s| s.name.as_str())
    }
}

impl Catalog {
    /// Validates a parsed document.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found.
    pub fn from_document(doc: CatalogDocument) -> Result<Self, ConfigurationError> {
        let mut stages = BTreeMap::new();
        for (name, mut def) in doc.stages {
            def.name = name.clone();
            validate_stage(&def, &doc.palette)?;
            stages.insert(name, Arc::new(def));
        }

        let mut substitutions = Vec::with_capacity(doc.substitutions.len());
        for sub in doc.substitutions {
            let referenced_by = format!("substitution /{}/", sub.pattern);
            for stage in [&sub.replace, &sub.with] {
                if !stages.contains_key(stage) {
                    return Err(ConfigurationError::unknown_stage(stage, &referenced_by));
                }
            }
            let pattern = Regex::new(&sub.pattern)
                .map_err(|e| ConfigurationError::invalid_pattern(&sub.pattern, e.to_string()))?;
            substitutions.push(CompiledSubstitution {
                pattern,
                replace: sub.replace,
                with: sub.with,
            });
        }

        let mut procedures = BTreeMap::new();
        for proc in doc.procedures {
            if proc.stages.is_empty() {
                return Err(ConfigurationError::invalid(format!(
                    "Procedure '{}' has no stages",
                    proc.id
                )));
            }
            if procedures.contains_key(&proc.id) {
                return Err(ConfigurationError::invalid(format!(
                    "Procedure '{}' is defined twice",
                    proc.id
                )));
            }
            procedures.insert(proc.id.clone(), proc);
        }

        let catalog = Self {
            stages,
            procedures,
            substitutions,
            palette: Arc::new(doc.palette),
        };
        for id in catalog.procedures.keys() {
            catalog.resolve(id)?;
        }
        info!(
            stages = catalog.stages.len(),
            procedures = catalog.procedures.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    /// Parses and validates a JSON catalog.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed JSON and a configuration
    /// error for an invalid catalog.
    pub fn from_json_str(json: &str) -> Result<Self, InspectflowError> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(doc)?)
    }

    /// Reads, parses and validates a JSON catalog file.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the file cannot be read, otherwise as
    /// [`Catalog::from_json_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, InspectflowError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Looks up a stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.get(name).map(AsRef::as_ref)
    }

    /// Procedure identifiers, sorted.
    pub fn procedure_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.procedures.keys().map(String::as_str)
    }

    /// Reference colours.
    #[must_use]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Resolves a procedure: applies substitutions whose pattern matches its
    /// id and checks every expectation its stages read.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProcedure` when the id is not in the catalog.
    pub fn resolve(&self, procedure_id: &str) -> Result<ResolvedProcedure, ConfigurationError> {
        let proc = self
            .procedures
            .get(procedure_id)
            .ok_or_else(|| ConfigurationError::unknown_procedure(procedure_id))?;

        let mut stages = Vec::with_capacity(proc.stages.len());
        for name in &proc.stages {
            let name = self.substitute(procedure_id, name);
            let def = self
                .stages
                .get(name)
                .ok_or_else(|| ConfigurationError::unknown_stage(name, procedure_id))?;
            validate_expectations(proc, def, &self.palette)?;
            stages.push(def.clone());
        }

        let mut seen = HashSet::new();
        if let Some(dup) = stages.iter().find(|s| !seen.insert(s.name.as_str())) {
            return Err(ConfigurationError::invalid(format!(
                "Procedure '{procedure_id}' lists stage '{}' more than once",
                dup.name
            )));
        }

        Ok(ResolvedProcedure {
            id: proc.id.clone(),
            stages,
            expectations: proc.expectations.clone(),
            palette: self.palette.clone(),
        })
    }

    fn substitute<'a>(&'a self, procedure_id: &str, stage: &'a str) -> &'a str {
        let mut current = stage;
        for sub in &self.substitutions {
            if sub.replace == current && sub.pattern.is_match(procedure_id) {
                debug!(procedure_id, from = %sub.replace, to = %sub.with, "Stage substituted");
                current = &sub.with;
            }
        }
        current
    }
}

fn validate_stage(def: &StageDefinition, palette: &Palette) -> Result<(), ConfigurationError> {
    if def.source.trim().is_empty() {
        return Err(ConfigurationError::invalid(format!("Stage '{}' has no source", def.name)));
    }
    if def.detector_model.trim().is_empty() {
        return Err(ConfigurationError::invalid(format!(
            "Stage '{}' has no detector model",
            def.name
        )));
    }
    for (label, required, limit) in def.kind.timings() {
        if !(required.is_finite() && required > 0.0) {
            return Err(ConfigurationError::invalid_timing(
                &def.name,
                format!("{label} required duration must be positive, got {required}"),
            ));
        }
        if !(limit.is_finite() && limit > 0.0) {
            return Err(ConfigurationError::invalid_timing(
                &def.name,
                format!("{label} timeout must be positive, got {limit}"),
            ));
        }
        if required > limit {
            return Err(ConfigurationError::invalid_timing(
                &def.name,
                format!("{label} requires {required}s but times out after {limit}s"),
            ));
        }
    }
    if let StageKind::ColorThenClass(params) = &def.kind {
        if let Some(color) = &params.class_color_fallback {
            if !palette.contains(color) {
                return Err(ConfigurationError::invalid(format!(
                    "Stage '{}' falls back to colour '{color}' which the palette does not define",
                    def.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_expectations(
    proc: &ProcedureDefinition,
    def: &StageDefinition,
    palette: &Palette,
) -> Result<(), ConfigurationError> {
    for key in def.kind.expectation_keys() {
        if !proc.expectations.contains_key(key) {
            return Err(ConfigurationError::missing_expectation(&proc.id, &def.name, key));
        }
    }
    if let StageKind::ColorThenClass(params) = &def.kind {
        let expected = proc
            .expectations
            .get(&params.expected_color_key)
            .map(String::as_str)
            .unwrap_or_default();
        if !palette.contains(expected) {
            return Err(ConfigurationError::invalid(format!(
                "Procedure '{}' expects colour '{expected}' which the palette does not define",
                proc.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_catalog_json;
    use pretty_assertions::assert_eq;

    fn doc() -> CatalogDocument {
        serde_json::from_str(&sample_catalog_json()).unwrap()
    }

    #[test]
    fn test_sample_catalog_is_valid() {
        let catalog = Catalog::from_document(doc()).unwrap();
        assert!(catalog.procedure_ids().any(|id| id == "dispatch-standard"));
        assert_eq!(catalog.stage("arrival").unwrap().name, "arrival");
        assert!(catalog.palette().contains("blue"));
    }

    #[test]
    fn test_resolve_unknown_procedure() {
        let catalog = Catalog::from_document(doc()).unwrap();
        let err = catalog.resolve("missing").unwrap_err();
        assert_eq!(err.code(), "CATALOG-001-UNKNOWN_PROCEDURE");
    }

    #[test]
    fn test_substitution_applies_only_to_matching_ids() {
        let catalog = Catalog::from_document(doc()).unwrap();

        let standard = catalog.resolve("dispatch-standard").unwrap();
        assert!(standard.stage_names().any(|s| s == "unload"));

        let pulp = catalog.resolve("dispatch-pulp").unwrap();
        let names: Vec<_> = pulp.stage_names().collect();
        assert!(names.contains(&"unload_cycle"));
        assert!(!names.contains(&"unload"));
    }

    #[test]
    fn test_unknown_stage_in_procedure() {
        let mut doc = doc();
        doc.procedures[0].stages.push("teleport".into());
        let err = Catalog::from_document(doc).unwrap_err();
        assert_eq!(err.code(), "CATALOG-002-UNKNOWN_STAGE");
    }

    #[test]
    fn test_missing_expectation() {
        let mut doc = doc();
        for proc in &mut doc.procedures {
            proc.expectations.remove("garment");
        }
        let err = Catalog::from_document(doc).unwrap_err();
        assert_eq!(err.code(), "CATALOG-003-MISSING_EXPECTATION");
    }

    #[test]
    fn test_required_longer_than_timeout() {
        let mut doc = doc();
        if let Some(def) = doc.stages.get_mut("arrival") {
            if let StageKind::Presence(p) = &mut def.kind {
                p.required_continuous_seconds = 60.0;
            }
        }
        let err = Catalog::from_document(doc).unwrap_err();
        assert_eq!(err.code(), "CATALOG-004-INVALID_TIMING");
    }

    #[test]
    fn test_invalid_substitution_pattern() {
        let mut doc = doc();
        doc.substitutions[0].pattern = "(".into();
        let err = Catalog::from_document(doc).unwrap_err();
        assert_eq!(err.code(), "CATALOG-005-INVALID_PATTERN");
    }

    #[test]
    fn test_expected_colour_must_be_in_palette() {
        let mut doc = doc();
        doc.procedures[0]
            .expectations
            .insert("pallet_color".into(), "magenta".into());
        let err = Catalog::from_document(doc).unwrap_err();
        assert_eq!(err.code(), "CATALOG-006-INVALID");
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let err = Catalog::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, InspectflowError::Serialization(_)));
    }
}
