//! Frame acquisition seams: the source, the bounded queue between the
//! source and the orchestrator, and the streaming output.
//!
//! Transport, decoding and reconnect-with-backoff live behind
//! [`FrameSource`]; the core only starts, stops and rebinds it.

mod output;
mod queue;

pub use output::{FrameOutput, NullFrameOutput, QueuedFrameOutput};
pub use queue::{frame_queue, FrameReceiver, FrameSender};

use std::collections::BTreeMap;
use tracing::debug;

use crate::errors::SourceError;

/// A producer of frames for one source at a time.
///
/// Implementations push frames into a [`FrameSender`] from their own task.
pub trait FrameSource: Send {
    /// Starts (or switches to) `source_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot be opened.
    fn start(&mut self, source_id: &str) -> Result<(), SourceError>;

    /// Stops producing frames. Idempotent.
    fn stop(&mut self);

    /// The source currently bound, if any.
    fn current(&self) -> Option<&str>;
}

/// A source driven entirely by the caller, as in replay and tests.
///
/// With a URI table it refuses ids the table does not list.
#[derive(Debug, Default)]
pub struct ManualFrameSource {
    current: Option<String>,
    uris: BTreeMap<String, String>,
}

impl ManualFrameSource {
    /// Creates an unbound source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the source to the configured ids.
    #[must_use]
    pub fn with_uris(mut self, uris: BTreeMap<String, String>) -> Self {
        self.uris = uris;
        self
    }
}

impl FrameSource for ManualFrameSource {
    fn start(&mut self, source_id: &str) -> Result<(), SourceError> {
        if !self.uris.is_empty() {
            let Some(uri) = self.uris.get(source_id) else {
                return Err(SourceError::new(source_id, "no URI configured"));
            };
            debug!(source_id, uri = %uri, "Source bound");
        }
        self.current = Some(source_id.to_string());
        Ok(())
    }

    fn stop(&mut self) {
        self.current = None;
    }

    fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}
