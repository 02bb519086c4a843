use parking_lot::Mutex;

use super::RunStore;
use crate::errors::PersistenceError;
use crate::orchestrator::ProcedureRun;

/// Keeps runs in memory.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: Mutex<Vec<ProcedureRun>>,
}

impl InMemoryRunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored runs, oldest first.
    #[must_use]
    pub fn runs(&self) -> Vec<ProcedureRun> {
        self.runs.lock().clone()
    }

    /// The most recent run.
    #[must_use]
    pub fn last(&self) -> Option<ProcedureRun> {
        self.runs.lock().last().cloned()
    }

    /// Number of stored runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.lock().len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.lock().is_empty()
    }
}

impl RunStore for InMemoryRunStore {
    fn append(&self, run: &ProcedureRun) -> Result<(), PersistenceError> {
        self.runs.lock().push(run.clone());
        Ok(())
    }
}
