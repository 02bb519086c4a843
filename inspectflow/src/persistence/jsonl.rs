//! One JSON object per line, appended to a file.

use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::RunStore;
use crate::errors::PersistenceError;
use crate::orchestrator::ProcedureRun;

/// Appends runs to a JSON-lines file, creating it and its parent
/// directory on first write.
#[derive(Debug)]
pub struct JsonLinesRunStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesRunStore {
    /// Creates a store writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The file written to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record back, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or a line does not
    /// decode.
    pub fn load_all(&self) -> Result<Vec<ProcedureRun>, PersistenceError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path)?;
        let mut runs = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let run = serde_json::from_str(&line).map_err(|e| PersistenceError::Encode(e.to_string()))?;
            runs.push(run);
        }
        Ok(runs)
    }
}

impl RunStore for JsonLinesRunStore {
    fn append(&self, run: &ProcedureRun) -> Result<(), PersistenceError> {
        let serialized = serde_json::to_string(run).map_err(|e| PersistenceError::Encode(e.to_string()))?;
        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{serialized}")?;
        debug!(run_id = %run.run_id, path = %self.path.display(), "Run record appended");
        Ok(())
    }
}
