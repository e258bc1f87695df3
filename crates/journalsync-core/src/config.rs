//! Configuration for building transmissions

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::document::EntityNamespace;
use crate::error::{SyncError, SyncResult};

/// Settings shared by every transmission a [`SyncStrategy`](crate::SyncStrategy)
/// builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Type-name prefixes used to recognise entities and collection wrappers
    #[serde(default)]
    pub namespace: EntityNamespace,
    /// Directory durable transmissions are written to
    #[serde(default)]
    pub transmission_dir: Option<PathBuf>,
}

impl StrategyConfig {
    pub fn with_transmission_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transmission_dir = Some(dir.into());
        self
    }

    pub fn with_namespace(mut self, namespace: EntityNamespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        serde_json::from_slice(&bytes).map_err(|e| {
            SyncError::Serialization(format!(
                "Invalid config {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }
}

/// Per-call options for a state-based transmission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmissionOptions {
    /// Also write the transmission to the configured directory
    pub persist_locally: bool,
    /// Ask the destination to answer with its own transmission
    pub request_response: bool,
    /// Upper bound on non-deletion records; deletions are never bounded
    pub max_records: Option<usize>,
}

impl TransmissionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persist_locally(mut self, persist: bool) -> Self {
        self.persist_locally = persist;
        self
    }

    pub fn request_response(mut self, request: bool) -> Self {
        self.request_response = request;
        self
    }

    pub fn max_records(mut self, max: usize) -> Self {
        self.max_records = Some(max);
        self
    }
}
