//! File-backed persistence for the Warden governor.
//!
//! # Modules
//!
//! - [`checkpoints`] -- [`FileCheckpointStore`], a directory of
//!   timestamped checkpoint files with a JSON-lines index.
//! - [`audit_log`] -- [`AuditLog`], the append-only JSON-lines audit trail.

pub mod audit_log;
pub mod checkpoints;
mod jsonl;

pub use audit_log::AuditLog;
pub use checkpoints::{FileCheckpointStore, INDEX_FILE};
