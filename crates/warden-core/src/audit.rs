//! Audit trail interface.
//!
//! The governor appends one [`AuditEntry`] per significant action, after
//! updating its own state and before publishing the matching event.

use std::sync::{Arc, Mutex, PoisonError};

use warden_types::AuditEntry;

/// Errors raised while appending to an audit trail.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Filesystem failure.
    #[error("audit I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The entry could not be serialized.
    #[error("audit serialization error: {source}")]
    Serialization {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },
}

/// Append-only record of governor actions.
pub trait AuditTrail: Send {
    /// Append `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] if the entry could not be durably written.
    fn record(&mut self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// In-process [`AuditTrail`] whose clones share one entry list.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditTrail {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditTrail {
    /// Create an empty trail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded entry, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of every recorded entry, oldest first.
    pub fn events(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.event).collect()
    }
}

impl AuditTrail for MemoryAuditTrail {
    fn record(&mut self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}
