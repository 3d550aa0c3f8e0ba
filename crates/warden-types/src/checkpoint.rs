//! Opaque checkpoint handles.
//!
//! A handle is produced by the checkpoint store when a snapshot is saved and
//! consumed, never parsed, by the governor when it rolls back.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::CheckpointId;

/// Reference to a saved simulation snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointHandle {
    /// Checkpoint identifier.
    pub id: CheckpointId,
    /// Location of the snapshot in the backing store.
    pub path: PathBuf,
    /// Wall-clock time the snapshot was written.
    pub created_at: DateTime<Utc>,
}

impl CheckpointHandle {
    /// Create a handle for a snapshot at `path` written now.
    pub fn new(path: PathBuf) -> Self {
        Self {
            id: CheckpointId::new(),
            path,
            created_at: Utc::now(),
        }
    }
}

impl core::fmt::Display for CheckpointHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
