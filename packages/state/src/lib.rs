#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Persisted last-alert marker.
//!
//! The alert pipeline records `{date, count}` after every successful
//! dispatch and reads it back at the start of the next run. Reads fail
//! open: a missing or corrupt record means "no alert sent yet".

use std::path::{Path, PathBuf};

use fire_alert_detection_models::RunState;

/// Errors that can occur reading or writing run state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// I/O error (file read/write).
    #[error("I/O error on {path}: {source}")]
    Io {
        /// State file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The stored record is not valid JSON for [`RunState`].
    #[error("Corrupt state record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Storage for the last dispatched alert.
pub trait StateStore: Send + Sync {
    /// Reads the stored state. `Ok(None)` means nothing has been stored.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the record exists but cannot be read or
    /// parsed.
    fn load(&self) -> Result<Option<RunState>, StateError>;

    /// Replaces the stored state.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the record cannot be written.
    fn save(&self, state: &RunState) -> Result<(), StateError>;
}

/// Loads state, treating every failure as "no prior alert".
pub fn load_or_empty(store: &dyn StateStore) -> Option<RunState> {
    match store.load() {
        Ok(state) => state,
        Err(e) => {
            log::warn!("Ignoring unreadable run state: {e}");
            None
        }
    }
}

/// [`StateStore`] backed by a small JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    /// Creates a store at `path`. Nothing is touched until the first
    /// read or write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl StateStore for JsonFileStateStore {
    fn load(&self) -> Result<Option<RunState>, StateError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save(&self, state: &RunState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        // Write-then-rename so a crash never leaves a truncated record.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(state)?).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        log::debug!(
            "Saved run state {} x{} to {}",
            state.date,
            state.count,
            self.path.display()
        );
        Ok(())
    }
}
