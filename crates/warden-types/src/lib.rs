//! Shared type definitions for the Warden supervisory control plane.
//!
//! Every crate in the workspace speaks in these types: the event bus tags
//! envelopes with [`EventId`], the governor reads [`Metrics`] and hands
//! [`CheckpointHandle`] values between the world and the checkpoint store,
//! and the audit log persists [`AuditEntry`] records.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for identifiers
//! - [`metrics`] -- Per-tick metric map and typed readers
//! - [`checkpoint`] -- Opaque checkpoint handles
//! - [`audit`] -- Audit log record shape
//! - [`status`] -- Governor phase and status snapshot

pub mod audit;
pub mod checkpoint;
pub mod ids;
pub mod metrics;
pub mod status;

// Re-export all public types at crate root for convenience.
pub use audit::AuditEntry;
pub use checkpoint::CheckpointHandle;
pub use ids::{CheckpointId, EventId};
pub use metrics::{
    CHECKPOINT_KEY, ContinuityReading, IDENTITY_CONTINUITY_KEY, Metrics, SELF_COPY_KEY,
    is_truthy, metric_flag, read_continuity,
};
pub use status::{GovernorPhase, GovernorStatus};
