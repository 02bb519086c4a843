//! # Inspectflow
//!
//! Tracks an operator through an ordered, multi-step physical handling
//! procedure (a vehicle arriving at a dock, garments being checked, pallets
//! loaded, the vehicle leaving) by watching camera frames through object
//! detectors.
//!
//! The crate is built from three layers:
//!
//! - **Gates** ([`gate::StageGate`]): debounce a noisy per-frame boolean into
//!   a verdict. A condition must hold continuously for a required duration,
//!   or the gate times out.
//! - **Stage trackers** ([`stages`]): turn detections into gate observations
//!   for one stage kind (presence, absence, departure, colour-then-class,
//!   load/unload cycle) and publish one step result per stage.
//! - **The orchestrator** ([`orchestrator::Orchestrator`]): runs a catalog
//!   procedure stage by stage, keeps a single detector resident, honours
//!   cancellation and persists the finished run.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use inspectflow::prelude::*;
//!
//! let catalog = Arc::new(Catalog::from_path("catalog.json")?);
//! let mut orchestrator = Orchestrator::builder(catalog, detectors)
//!     .with_store(Arc::new(JsonLinesRunStore::new("runs.jsonl")))
//!     .build();
//!
//! orchestrator.start("dispatch-standard")?;
//! let outcome = drive(&mut orchestrator, &mut frames).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod catalog;
pub mod core;
pub mod errors;
pub mod events;
pub mod gate;
pub mod observability;
pub mod orchestrator;
pub mod persistence;
pub mod replay;
pub mod runner;
pub mod source;
pub mod stages;
pub mod testing;
pub mod utils;
pub mod vision;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::catalog::{Catalog, ResolvedProcedure, RuntimeConfig, StageDefinition, StageKind};
    pub use crate::core::{AlertEvent, GateState, GateVerdict, StepEvent};
    pub use crate::errors::{ConfigurationError, DetectorError, InspectflowError, PersistenceError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, StepPublisher};
    pub use crate::gate::StageGate;
    pub use crate::orchestrator::{
        Orchestrator, OrchestratorBuilder, OrchestratorState, ProcedureRun, RunContext, RunOutcome,
    };
    pub use crate::persistence::{InMemoryRunStore, JsonLinesRunStore, RunStore};
    pub use crate::runner::{apply_control_message, drive, ControlMessage};
    pub use crate::source::{frame_queue, FrameOutput, FrameReceiver, FrameSender, FrameSource};
    pub use crate::stages::{StageTracker, StepRecord, TrackerFactory};
    pub use crate::utils::{iso_timestamp, Clock, SystemClock, Timestamp};
    pub use crate::vision::{Detection, DetectionFilter, Detector, DetectorFactory, Frame, Roi};
    pub use std::sync::Arc;
}
