//! Runtime settings outside the catalog: queue sizes, paths, sources.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::errors::InspectflowError;
use crate::observability::LogFormat;
use crate::source::{frame_queue, FrameReceiver, FrameSender, ManualFrameSource, QueuedFrameOutput};
use crate::vision::AnnotatedFrame;
use crate::vision::DEFAULT_FRAME_SIDE;

/// Environment variable naming the catalog file.
pub const ENV_CATALOG: &str = "INSPECTFLOW_CATALOG";
/// Environment variable naming the run store file.
pub const ENV_STORE: &str = "INSPECTFLOW_STORE";
/// Environment variable selecting the log format (`text` or `json`).
pub const ENV_LOG: &str = "INSPECTFLOW_LOG";

/// Process-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path of the stage catalog.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    /// Path of the JSON-lines run store.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Frames buffered between the source and the orchestrator.
    #[serde(default = "default_frame_queue")]
    pub frame_queue_capacity: usize,
    /// Annotated frames buffered for the streaming surface.
    #[serde(default = "default_output_queue")]
    pub output_queue_capacity: usize,
    /// Bus payloads buffered before publication.
    #[serde(default = "default_event_queue")]
    pub event_queue_capacity: usize,
    /// Side of the square frames are normalized to before ROI math.
    #[serde(default = "default_frame_side")]
    pub frame_side: u32,
    /// Source id to transport URI.
    #[serde(default)]
    pub sources: BTreeMap<String, String>,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("catalog.json")
}

fn default_store_path() -> PathBuf {
    PathBuf::from("runs.jsonl")
}

fn default_frame_queue() -> usize {
    8
}

fn default_output_queue() -> usize {
    4
}

fn default_event_queue() -> usize {
    256
}

fn default_frame_side() -> u32 {
    DEFAULT_FRAME_SIDE
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            store_path: default_store_path(),
            frame_queue_capacity: default_frame_queue(),
            output_queue_capacity: default_output_queue(),
            event_queue_capacity: default_event_queue(),
            frame_side: default_frame_side(),
            sources: BTreeMap::new(),
            log_format: LogFormat::default(),
        }
    }
}

impl RuntimeConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, InspectflowError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Applies `INSPECTFLOW_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key lookup.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_CATALOG) {
            self.catalog_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_STORE) {
            self.store_path = PathBuf::from(path);
        }
        if let Some(format) = lookup(ENV_LOG).and_then(|f| f.parse().ok()) {
            self.log_format = format;
        }
        self
    }

    /// Sets the frame queue capacity.
    #[must_use]
    pub fn with_frame_queue_capacity(mut self, capacity: usize) -> Self {
        self.frame_queue_capacity = capacity;
        self
    }

    /// The bounded queue between a frame source and the runner.
    #[must_use]
    pub fn frame_queue(&self) -> (FrameSender, FrameReceiver) {
        frame_queue(self.frame_queue_capacity)
    }

    /// The streaming output and the receiver its viewer reads.
    #[must_use]
    pub fn frame_output(&self) -> (QueuedFrameOutput, mpsc::Receiver<AnnotatedFrame>) {
        QueuedFrameOutput::new(self.output_queue_capacity)
    }

    /// A caller-driven source limited to the configured sources. With no
    /// sources configured every id is accepted.
    #[must_use]
    pub fn frame_source(&self) -> ManualFrameSource {
        ManualFrameSource::new().with_uris(self.sources.clone())
    }

    /// Registers a source URI.
    #[must_use]
    pub fn with_source(mut self, id: impl Into<String>, uri: impl Into<String>) -> Self {
        self.sources.insert(id.into(), uri.into());
        self
    }
}
