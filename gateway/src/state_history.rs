//! Persisted startup/shutdown history of the gateway.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use inference_common::timefmt::{elapsed_to_str, parse_timestamp, TIMESTAMP_FORMAT};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// On-disk layout of the state file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateHistory {
    #[serde(rename = "PREVIOUS_STARTUP", default)]
    pub previous_startup: Option<String>,
    #[serde(rename = "CURRENT_STARTUP", default)]
    pub current_startup: Option<String>,
    #[serde(rename = "LAST_SHUTDOWN", default)]
    pub last_shutdown: Option<String>,
    /// Runtime of the last completed run, `H:MM:SS`.
    #[serde(rename = "LAST_RUNTIME_HOURS", default)]
    pub last_runtime: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Startup,
    Shutdown,
}

impl StateHistory {
    /// Apply a transition at `now`.
    pub fn apply(&mut self, transition: Transition, now: NaiveDateTime) {
        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        match transition {
            Transition::Startup => {
                self.previous_startup = self.current_startup.take();
                self.current_startup = Some(stamp);
            }
            Transition::Shutdown => {
                self.last_runtime = self
                    .current_startup
                    .as_deref()
                    .and_then(parse_timestamp)
                    .map(|started| {
                        let secs = (now - started).num_seconds().max(0) as u64;
                        elapsed_to_str(secs)
                    });
                self.last_shutdown = Some(stamp);
            }
        }
    }
}

/// State history bound to its file; every update is flushed before returning.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    history: Mutex<StateHistory>,
}

impl StateStore {
    /// Load the history at `path`. A missing or unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let history = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(history) => {
                    tracing::info!("Loaded gateway state history from {}", path.display());
                    history
                }
                Err(e) => {
                    tracing::warn!("Ignoring malformed state file {}: {}", path.display(), e);
                    StateHistory::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No state history at {}", path.display());
                StateHistory::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read state file {}: {}", path.display(), e);
                StateHistory::default()
            }
        };

        Self {
            path,
            history: Mutex::new(history),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> StateHistory {
        match self.history.lock() {
            Ok(history) => history.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Record a transition happening now.
    pub fn record(&self, transition: Transition) -> Result<StateHistory, StateError> {
        self.record_at(transition, Local::now().naive_local())
    }

    pub fn record_at(
        &self,
        transition: Transition,
        now: NaiveDateTime,
    ) -> Result<StateHistory, StateError> {
        let mut history = match self.history.lock() {
            Ok(history) => history,
            Err(poisoned) => poisoned.into_inner(),
        };
        history.apply(transition, now);
        self.save(&history)?;
        tracing::info!(
            "Gateway state updated ({:?}): {}",
            transition,
            serde_json::to_string(&*history)?
        );
        Ok(history.clone())
    }

    /// Write to a sibling temp file, then rename over the target.
    fn save(&self, history: &StateHistory) -> Result<(), StateError> {
        let write_err = |source| StateError::Write {
            path: self.path.display().to_string(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let json = serde_json::to_vec_pretty(history)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(&json).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}
