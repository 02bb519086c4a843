//! Durable storage of finished runs.
//!
//! The orchestrator appends exactly one record per run, at finalize. A
//! store failure is logged by the caller and never blocks the run's end.

mod jsonl;
mod memory;

pub use jsonl::JsonLinesRunStore;
pub use memory::InMemoryRunStore;

use crate::errors::PersistenceError;
use crate::orchestrator::ProcedureRun;

/// Append-only store of run records.
#[cfg_attr(test, mockall::automock)]
pub trait RunStore: Send + Sync {
    /// Appends one finalized run.
    ///
    /// # Errors
    ///
    /// Returns an error when the record could not be written.
    fn append(&self, run: &ProcedureRun) -> Result<(), PersistenceError>;
}
