//! Error types for the inspectflow crate.
//!
//! Configuration problems are fatal to the request that surfaced them and
//! carry a diagnostic code. Detector, persistence and source failures are
//! runtime faults that the orchestrator contains rather than propagates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for inspectflow operations.
#[derive(Debug, Error)]
pub enum InspectflowError {
    /// The catalog or a start request referenced something invalid.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A detector failed to load or to process a frame.
    #[error("{0}")]
    Detector(#[from] DetectorError),

    /// A run record could not be persisted.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// The frame source could not be (re)bound.
    #[error("{0}")]
    Source(#[from] SourceError),

    /// A run is already in progress in this orchestrator.
    #[error("Procedure '{active}' is already running")]
    AlreadyRunning {
        /// The procedure currently running.
        active: String,
    },

    /// The orchestrator has already finished its single run.
    #[error("Orchestrator already finished; a new run requires a new orchestrator")]
    Finished,

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for InspectflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Diagnostic metadata attached to configuration errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorInfo {
    /// Error code (e.g., "CATALOG-001-UNKNOWN_PROCEDURE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Compact JSON form for structured logs; empty fields are omitted.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("code".into(), self.code.clone().into());
        map.insert("summary".into(), self.summary.clone().into());
        if let Some(hint) = &self.fix_hint {
            map.insert("fix_hint".into(), hint.clone().into());
        }
        if !self.context.is_empty() {
            map.insert("context".into(), serde_json::json!(self.context));
        }
        serde_json::Value::Object(map)
    }
}

/// Error raised when the catalog is invalid or a request references
/// something the catalog does not define.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// Diagnostic info.
    pub info: ErrorInfo,
}

impl ConfigurationError {
    fn build(code: &str, message: String) -> Self {
        Self {
            info: ErrorInfo::new(code, message.clone()),
            message,
        }
    }

    /// The requested procedure is not in the catalog.
    #[must_use]
    pub fn unknown_procedure(procedure_id: &str) -> Self {
        let mut err = Self::build(
            "CATALOG-001-UNKNOWN_PROCEDURE",
            format!("Unknown procedure: '{procedure_id}'"),
        );
        err.info = err
            .info
            .with_fix_hint("Check the procedure id against the catalog's procedure list.")
            .with_context_entry("procedure", procedure_id);
        err
    }

    /// A procedure or substitution names a stage that is not defined.
    #[must_use]
    pub fn unknown_stage(stage: &str, referenced_by: &str) -> Self {
        let mut err = Self::build(
            "CATALOG-002-UNKNOWN_STAGE",
            format!("Unknown stage '{stage}' referenced by '{referenced_by}'"),
        );
        err.info = err
            .info
            .with_context_entry("stage", stage)
            .with_context_entry("referenced_by", referenced_by);
        err
    }

    /// A stage needs an expectation the procedure does not provide.
    #[must_use]
    pub fn missing_expectation(procedure_id: &str, stage: &str, key: &str) -> Self {
        let mut err = Self::build(
            "CATALOG-003-MISSING_EXPECTATION",
            format!("Procedure '{procedure_id}' does not define expectation '{key}' required by stage '{stage}'"),
        );
        err.info = err
            .info
            .with_fix_hint("Add the key to the procedure's expectations map.")
            .with_context_entry("procedure", procedure_id)
            .with_context_entry("stage", stage)
            .with_context_entry("key", key);
        err
    }

    /// Timing values for a stage are inconsistent.
    #[must_use]
    pub fn invalid_timing(stage: &str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let mut err = Self::build(
            "CATALOG-004-INVALID_TIMING",
            format!("Invalid timing for stage '{stage}': {detail}"),
        );
        err.info = err.info.with_context_entry("stage", stage);
        err
    }

    /// A substitution pattern is not a valid regular expression.
    #[must_use]
    pub fn invalid_pattern(pattern: &str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self::build(
            "CATALOG-005-INVALID_PATTERN",
            format!("Invalid substitution pattern '{pattern}': {detail}"),
        )
    }

    /// Any other structural problem in the catalog.
    #[must_use]
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::build("CATALOG-006-INVALID", detail.into())
    }

    /// Returns the diagnostic code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.info.code
    }
}

/// A detector failed. Per-frame failures are contained by the tracker.
#[derive(Debug, Clone, Error)]
pub enum DetectorError {
    /// The model could not be loaded.
    #[error("Failed to load detector model '{model}': {reason}")]
    Load {
        /// Model identifier.
        model: String,
        /// Failure reason.
        reason: String,
    },

    /// Inference on a single frame failed.
    #[error("Detection failed: {0}")]
    Inference(String),
}

/// A run record could not be written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Underlying IO failure.
    #[error("Run store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be encoded.
    #[error("Run store encoding error: {0}")]
    Encode(String),

    /// The store rejected the record.
    #[error("Run store rejected record: {0}")]
    Rejected(String),
}

/// The frame source could not be started.
#[derive(Debug, Clone, Error)]
#[error("Frame source '{source_id}' failed: {reason}")]
pub struct SourceError {
    /// The source that failed.
    pub source_id: String,
    /// Failure reason.
    pub reason: String,
}

impl SourceError {
    /// Creates a new source error.
    #[must_use]
    pub fn new(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_procedure_code_and_context() {
        let err = ConfigurationError::unknown_procedure("ghost");
        assert_eq!(err.code(), "CATALOG-001-UNKNOWN_PROCEDURE");
        assert!(err.to_string().contains("ghost"));
        assert_eq!(err.info.context.get("procedure"), Some(&"ghost".to_string()));
        assert!(err.info.fix_hint.is_some());
    }

    #[test]
    fn test_error_info_json_omits_empty_fields() {
        let info = ErrorInfo::new("X-1", "summary").with_context_entry("k", "v");
        let json = info.to_json();
        assert_eq!(json["code"], "X-1");
        assert_eq!(json["context"]["k"], "v");
        assert!(json.get("fix_hint").is_none());
    }

    #[test]
    fn test_wrapping_into_main_error() {
        let err: InspectflowError = ConfigurationError::unknown_stage("wrap", "proc-a").into();
        assert!(matches!(err, InspectflowError::Configuration(_)));
        assert!(err.to_string().contains("wrap"));

        let err: InspectflowError = DetectorError::Inference("cuda oom".into()).into();
        assert!(err.to_string().contains("cuda oom"));
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::new("cam_pallet", "connection refused");
        assert_eq!(err.to_string(), "Frame source 'cam_pallet' failed: connection refused");
    }
}
