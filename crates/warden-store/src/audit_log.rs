//! Append-only JSON-lines audit log.
//!
//! Each record is serialized to a single line and written with one
//! `write_all` followed by a flush, so a crash leaves at most one torn line
//! at the end of the file. [`AuditLog::read_all`] skips that line, and the
//! next append cuts it off before writing.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;
use warden_core::{AuditError, AuditTrail};
use warden_types::AuditEntry;

use crate::jsonl::append_line;

/// [`AuditTrail`] writing to a JSON-lines file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Use the log file at `path`, creating its parent directory.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the parent directory cannot be
    /// created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// The log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse every complete record, oldest first.
    ///
    /// A missing file reads as empty. An unparsable final line without a
    /// trailing newline is a torn write and is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the file cannot be read, or
    /// [`AuditError::Serialization`] if a complete line is corrupt.
    pub fn read_all(&self) -> Result<Vec<AuditEntry>, AuditError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let torn_tail = !contents.is_empty() && !contents.ends_with('\n');
        let total = contents.lines().count();
        let mut entries = Vec::with_capacity(total);
        for (n, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(err) if torn_tail && n.saturating_add(1) == total => {
                    warn!(path = %self.path.display(), error = %err, "Skipping torn audit line");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(entries)
    }
}

impl AuditTrail for AuditLog {
    fn record(&mut self, entry: &AuditEntry) -> Result<(), AuditError> {
        let line = serde_json::to_string(entry)?;
        append_line(&self.path, &line)?;
        Ok(())
    }
}
