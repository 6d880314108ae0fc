//! Escalation state persisted between process invocations.
//!
//! When the agent is re-invoked once per interval (cron, supervisor respawn)
//! the in-memory counter would restart at zero every time and the
//! once-per-episode remediation would never fire. The store keeps the counter
//! and the open incident id in a small JSON file.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::escalation::EscalationState;

/// Errors writing the state file.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to write state file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything carried from one cycle to the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub escalation: EscalationState,
    /// Incident opened for the current DOWN streak, if any.
    #[serde(default)]
    pub open_incident_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// JSON file holding [`PersistedState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state. A missing file is a fresh start; an unreadable or
    /// corrupt file is logged and also treated as a fresh start.
    #[must_use]
    pub fn load(&self) -> PersistedState {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file, starting fresh");
                return PersistedState::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read state file, starting fresh");
                return PersistedState::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt state file, starting fresh");
                PersistedState::default()
            }
        }
    }

    /// Write the state, replacing the previous file atomically.
    pub fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        let io_err = |source| StateError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;

        debug!(
            path = %self.path.display(),
            down_count = state.escalation.consecutive_down_count,
            "State saved"
        );
        Ok(())
    }

    /// Remove the state file, if present.
    pub fn reset(&self) -> Result<(), StateError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Io {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }
}
