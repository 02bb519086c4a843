//! Builds the tracker for a stage definition.

use std::sync::Arc;

use super::{ColorThenClassTracker, Criterion, LoadUnloadTracker, SinglePhaseTracker, StageTracker};
use crate::catalog::{ResolvedProcedure, SinglePhaseParams, StageDefinition, StageKind};
use crate::errors::ConfigurationError;
use crate::events::StepPublisher;
use crate::vision::DetectionFilter;

/// Creates trackers keyed by [`StageKind`], resolving expectation-dependent
/// parameters against the running procedure.
#[derive(Debug, Clone)]
pub struct TrackerFactory {
    publisher: StepPublisher,
}

impl TrackerFactory {
    /// Creates a factory whose trackers publish through `publisher`.
    #[must_use]
    pub fn new(publisher: StepPublisher) -> Self {
        Self { publisher }
    }

    /// Builds the tracker for `definition` within `procedure`.
    ///
    /// # Errors
    ///
    /// Returns `MissingExpectation` when the procedure lacks a value the
    /// stage reads. The catalog validates this at load, so it only fires
    /// for procedures built outside a catalog.
    pub fn build(
        &self,
        definition: &Arc<StageDefinition>,
        procedure: &ResolvedProcedure,
    ) -> Result<Box<dyn StageTracker>, ConfigurationError> {
        let def = definition.clone();
        let publisher = self.publisher.clone();
        let tracker: Box<dyn StageTracker> = match &definition.kind {
            StageKind::Presence(p) => self.single(def, Criterion::Presence, p, procedure)?,
            StageKind::Absence(p) => self.single(def, Criterion::Absence, p, procedure)?,
            StageKind::Departure(p) => self.single(def, Criterion::Departure, p, procedure)?,
            StageKind::ColorThenClass(p) => {
                let expected_color = expectation(procedure, definition, &p.expected_color_key)?;
                let class_filter = resolve_filter(&p.class_filter, procedure, definition)?;
                let check_class = match (&p.no_check_class, p.class_filter.labels.expectation_key()) {
                    (Some(no_check), Some(key)) => procedure.expectations.get(key) != Some(no_check),
                    _ => true,
                };
                let mut params = p.clone();
                params.class_filter = class_filter;
                Box::new(ColorThenClassTracker::new(
                    def,
                    params,
                    procedure.palette.clone(),
                    expected_color,
                    check_class,
                    publisher,
                ))
            }
            StageKind::LoadUnloadCycle(p) => {
                let filter = resolve_filter(&p.filter, procedure, definition)?;
                Box::new(LoadUnloadTracker::new(def, p, filter, publisher))
            }
        };
        Ok(tracker)
    }

    fn single(
        &self,
        def: Arc<StageDefinition>,
        criterion: Criterion,
        params: &SinglePhaseParams,
        procedure: &ResolvedProcedure,
    ) -> Result<Box<dyn StageTracker>, ConfigurationError> {
        let filter = resolve_filter(&params.filter, procedure, &def)?;
        let exempt = match (&params.exempt_value, params.filter.labels.expectation_key()) {
            (Some(exempt), Some(key)) => procedure.expectations.get(key) == Some(exempt),
            _ => false,
        };
        let tracker = SinglePhaseTracker::new(
            def,
            criterion,
            filter,
            params.required_continuous_seconds,
            params.timeout_seconds,
            self.publisher.clone(),
        );
        Ok(Box::new(if exempt { tracker.exempt() } else { tracker }))
    }
}

fn expectation(
    procedure: &ResolvedProcedure,
    def: &StageDefinition,
    key: &str,
) -> Result<String, ConfigurationError> {
    procedure
        .expectations
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigurationError::missing_expectation(&procedure.id, &def.name, key))
}

fn resolve_filter(
    filter: &DetectionFilter,
    procedure: &ResolvedProcedure,
    def: &StageDefinition,
) -> Result<DetectionFilter, ConfigurationError> {
    filter
        .resolve(&procedure.expectations)
        .map_err(|key| ConfigurationError::missing_expectation(&procedure.id, &def.name, &key))
}
