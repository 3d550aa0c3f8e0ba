//! Directory of timestamped checkpoint files with a JSON-lines index.
//!
//! Layout:
//!
//! ```text
//! <dir>/
//!   checkpoint-20260101T120000.000000Z-<id>.json
//!   checkpoint-20260101T120010.000000Z-<id>.json
//!   index.jsonl            one CheckpointHandle per line, oldest first
//! ```
//!
//! Checkpoint files are written to a temporary name and renamed into
//! place, and are never rewritten afterwards. The index is append-only; a
//! torn final index line left by a crash is cut off by the next append.
//! A reader listing checkpoints therefore needs no lock.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};
use warden_core::{CheckpointError, CheckpointStore};
use warden_types::{CheckpointHandle, CheckpointId};

use crate::jsonl::append_line;

/// Name of the index file inside the checkpoint directory.
pub const INDEX_FILE: &str = "index.jsonl";

/// [`CheckpointStore`] backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    index: PathBuf,
}

impl FileCheckpointStore {
    /// Open (creating if needed) the checkpoint directory at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let index = dir.join(INDEX_FILE);
        Ok(Self { dir, index })
    }

    /// The checkpoint directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The index file.
    pub fn index_path(&self) -> &Path {
        &self.index
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&mut self, state: &Value) -> Result<CheckpointHandle, CheckpointError> {
        let id = CheckpointId::new();
        let created_at = Utc::now();
        let name = format!(
            "checkpoint-{}-{id}.json",
            created_at.format("%Y%m%dT%H%M%S%.6fZ")
        );
        let path = self.dir.join(name);
        let staging = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(state)?;
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &path)?;

        debug!(path = %path.display(), "Checkpoint written");
        Ok(CheckpointHandle {
            id,
            path,
            created_at,
        })
    }

    fn register(&mut self, handle: &CheckpointHandle) -> Result<(), CheckpointError> {
        let line = serde_json::to_string(handle)?;
        append_line(&self.index, &line)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<CheckpointHandle>, CheckpointError> {
        let contents = match fs::read_to_string(&self.index) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut handles = Vec::new();
        for (n, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CheckpointHandle>(line) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    warn!(line = n.saturating_add(1), error = %err, "Skipping unreadable index line");
                }
            }
        }
        Ok(handles)
    }

    fn load(&self, handle: &CheckpointHandle) -> Result<Value, CheckpointError> {
        let bytes = match fs::read(&handle.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound {
                    handle: handle.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}
