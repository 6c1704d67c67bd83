//! Persistence layer.
//!
//! Single-slot JSON documents in a data directory: the latest snapshot
//! (`supply-data.json`) and the refresh marker (`metadata.json`). Every
//! write replaces the whole document by writing a temp file and renaming
//! it over the target, so a reader sees either the old snapshot or the
//! new one, never a mix.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::{RefreshMarker, Snapshot, SupplyError};

const SNAPSHOT_FILE: &str = "supply-data.json";
const MARKER_FILE: &str = "metadata.json";

/// Durable home of the latest snapshot and refresh marker.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    fn marker_path(&self) -> PathBuf {
        self.data_dir.join(MARKER_FILE)
    }

    /// Create the data directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<(), SupplyError> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| persist_error(&self.data_dir, e))
    }

    /// Overwrite the stored snapshot.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), SupplyError> {
        let path = self.snapshot_path();
        self.write_document(&path, snapshot)?;
        info!(path = %path.display(), cards = snapshot.len(), "Snapshot saved");
        Ok(())
    }

    /// The stored snapshot, or `None` if there is none (or it is unreadable).
    pub fn load(&self) -> Option<Snapshot> {
        read_document(&self.snapshot_path())
    }

    /// Overwrite the stored refresh marker.
    pub fn save_marker(&self, marker: &RefreshMarker) -> Result<(), SupplyError> {
        let path = self.marker_path();
        self.write_document(&path, marker)?;
        debug!(path = %path.display(), "Refresh marker saved");
        Ok(())
    }

    /// The stored marker; a missing or unreadable document reads as all-absent.
    pub fn load_marker(&self) -> RefreshMarker {
        read_document(&self.marker_path()).unwrap_or_default()
    }

    fn write_document<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), SupplyError> {
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(value).map_err(|e| SupplyError::Persist {
            path: path.display().to_string(),
            message: format!("serialisation failed: {e}"),
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| persist_error(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| persist_error(path, e))?;
        Ok(())
    }
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No stored document");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read stored document");
            return None;
        }
    };

    match serde_json::from_str(&json) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Stored document is corrupt, ignoring it");
            None
        }
    }
}

fn persist_error(path: &Path, e: std::io::Error) -> SupplyError {
    SupplyError::Persist {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
