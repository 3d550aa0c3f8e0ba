//! Checkpoint store interface consumed by the governor.
//!
//! The governor only needs to save a state blob, index the resulting
//! handle, list handles oldest first, and load one back. It never caches
//! checkpoint contents: every rollback asks the store for its latest
//! handle.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use warden_types::CheckpointHandle;

use crate::world::WorldError;

/// Errors raised while saving, indexing, or loading checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Filesystem failure.
    #[error("checkpoint I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A checkpoint or index line could not be (de)serialized.
    #[error("checkpoint serialization error: {source}")]
    Serialization {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },

    /// The world could not export its state.
    #[error("world state unavailable: {source}")]
    State {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// The handle does not refer to a stored checkpoint.
    #[error("checkpoint not found: {handle}")]
    NotFound {
        /// Display form of the missing handle.
        handle: String,
    },

    /// The store refused the operation.
    #[error("checkpoint store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

/// Durable snapshot storage.
pub trait CheckpointStore: Send {
    /// Persist `state` and return a handle to it.
    ///
    /// The handle is not listed until [`register`](Self::register) is
    /// called with it.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the state could not be written.
    fn save(&mut self, state: &Value) -> Result<CheckpointHandle, CheckpointError>;

    /// Add `handle` to the index.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the index could not be updated.
    fn register(&mut self, handle: &CheckpointHandle) -> Result<(), CheckpointError>;

    /// Every indexed handle, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the index could not be read.
    fn list(&self) -> Result<Vec<CheckpointHandle>, CheckpointError>;

    /// The most recently indexed handle, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the index could not be read.
    fn latest(&self) -> Result<Option<CheckpointHandle>, CheckpointError> {
        Ok(self.list()?.pop())
    }

    /// Read the state saved under `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the checkpoint is missing or
    /// unreadable.
    fn load(&self, handle: &CheckpointHandle) -> Result<Value, CheckpointError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    blobs: Vec<(CheckpointHandle, Value)>,
    index: Vec<CheckpointHandle>,
    fail_saves: bool,
    fail_loads: bool,
    fail_lists: bool,
}

/// In-process [`CheckpointStore`].
///
/// Clones share the same storage, so a test can keep one clone for
/// inspection after handing another to the governor.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut MemoryInner) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Save and index `state` in one step.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Unavailable`] if saves are failing.
    pub fn seed(&mut self, state: Value) -> Result<CheckpointHandle, CheckpointError> {
        let handle = self.save(&state)?;
        self.register(&handle)?;
        Ok(handle)
    }

    /// Make later saves fail.
    pub fn fail_saves(&self, fail: bool) {
        self.with(|inner| inner.fail_saves = fail);
    }

    /// Make later loads fail.
    pub fn fail_loads(&self, fail: bool) {
        self.with(|inner| inner.fail_loads = fail);
    }

    /// Make later index reads (`list`, `latest`) fail.
    pub fn fail_lists(&self, fail: bool) {
        self.with(|inner| inner.fail_lists = fail);
    }

    /// Number of indexed checkpoints.
    pub fn len(&self) -> usize {
        self.with(|inner| inner.index.len())
    }

    /// Whether no checkpoint is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&mut self, state: &Value) -> Result<CheckpointHandle, CheckpointError> {
        self.with(|inner| {
            if inner.fail_saves {
                return Err(CheckpointError::Unavailable {
                    message: String::from("saves disabled"),
                });
            }
            let n = inner.blobs.len();
            let handle = CheckpointHandle::new(PathBuf::from(format!("memory/{n}.json")));
            inner.blobs.push((handle.clone(), state.clone()));
            Ok(handle)
        })
    }

    fn register(&mut self, handle: &CheckpointHandle) -> Result<(), CheckpointError> {
        self.with(|inner| inner.index.push(handle.clone()));
        Ok(())
    }

    fn list(&self) -> Result<Vec<CheckpointHandle>, CheckpointError> {
        self.with(|inner| {
            if inner.fail_lists {
                return Err(CheckpointError::Unavailable {
                    message: String::from("index unreadable"),
                });
            }
            Ok(inner.index.clone())
        })
    }

    fn load(&self, handle: &CheckpointHandle) -> Result<Value, CheckpointError> {
        self.with(|inner| {
            if inner.fail_loads {
                return Err(CheckpointError::Unavailable {
                    message: String::from("loads disabled"),
                });
            }
            inner
                .blobs
                .iter()
                .find(|(h, _)| h.id == handle.id)
                .map(|(_, state)| state.clone())
                .ok_or_else(|| CheckpointError::NotFound {
                    handle: handle.to_string(),
                })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn saved_but_unregistered_is_not_listed() {
        let mut store = MemoryCheckpointStore::new();
        let handle = store.save(&json!({ "n": 1 })).unwrap();
        assert!(store.latest().unwrap().is_none());
        assert_eq!(store.load(&handle).unwrap(), json!({ "n": 1 }));
    }

    #[test]
    fn latest_is_last_registered() {
        let mut store = MemoryCheckpointStore::new();
        let first = store.seed(json!(1)).unwrap();
        let second = store.seed(json!(2)).unwrap();
        assert_eq!(store.list().unwrap(), vec![first, second.clone()]);
        assert_eq!(store.latest().unwrap(), Some(second));
    }

    #[test]
    fn unknown_handle_is_not_found() {
        let store = MemoryCheckpointStore::new();
        let stray = CheckpointHandle::new(PathBuf::from("elsewhere.json"));
        assert!(matches!(
            store.load(&stray),
            Err(CheckpointError::NotFound { .. })
        ));
    }

    #[test]
    fn clones_share_storage() {
        let mut store = MemoryCheckpointStore::new();
        let observer = store.clone();
        let _ = store.seed(json!({})).unwrap();
        assert_eq!(observer.len(), 1);

        observer.fail_saves(true);
        assert!(store.save(&json!({})).is_err());
    }

    #[test]
    fn failing_index_reads_surface_as_errors() {
        let mut store = MemoryCheckpointStore::new();
        let _ = store.seed(json!(1)).unwrap();
        store.fail_lists(true);
        assert!(matches!(
            store.latest(),
            Err(CheckpointError::Unavailable { .. })
        ));

        store.fail_lists(false);
        assert!(store.latest().unwrap().is_some());
    }
}
