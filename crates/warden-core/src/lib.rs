//! Supervisory control plane for a simulated world.
//!
//! The [`Governor`] decides, tick by tick, whether the world may advance.
//! It pauses, resumes, and shuts down on command, rolls the world back to
//! its latest checkpoint when `identity_continuity` drops below threshold
//! or a policy vetoes, and announces every transition on the
//! [`EventBus`](warden_events::EventBus) after writing it to the audit
//! trail.
//!
//! # Modules
//!
//! - [`audit`] -- [`AuditTrail`] trait and an in-memory trail.
//! - [`checkpoint`] -- [`CheckpointStore`] trait and an in-memory store.
//! - [`config`] -- Configuration loading from `warden-config.yaml`.
//! - [`control`] -- Administrative command channel.
//! - [`governor`] -- The [`Governor`] itself.
//! - [`law`] -- Standing reactions to governor events.
//! - [`policy`] -- Veto predicates, including [`no_self_copy`].
//! - [`runner`] -- The supervised world loop.
//! - [`world`] -- The [`World`] collaborator trait and [`ScriptedWorld`].
//!
//! [`AuditTrail`]: audit::AuditTrail
//! [`CheckpointStore`]: checkpoint::CheckpointStore
//! [`Governor`]: governor::Governor
//! [`no_self_copy`]: policy::no_self_copy
//! [`World`]: world::World
//! [`ScriptedWorld`]: world::ScriptedWorld

pub mod audit;
pub mod checkpoint;
pub mod config;
pub mod control;
pub mod governor;
pub mod law;
pub mod policy;
pub mod runner;
pub mod world;

pub use audit::{AuditError, AuditTrail, MemoryAuditTrail};
pub use checkpoint::{CheckpointError, CheckpointStore, MemoryCheckpointStore};
pub use config::{ConfigError, WardenConfig};
pub use control::{
    CommandReceiver, ControlClosed, ControlHandle, GovernorCommand, apply_command,
    control_channel,
};
pub use governor::{Governor, GovernorError, NO_SAFE_CHECKPOINT};
pub use law::{Law, LawAction, LawBook};
pub use policy::{Policy, PolicyVerdict, no_self_copy};
pub use runner::{RunEndReason, RunSummary, RunnerError, run_world};
pub use world::{ScriptedWorld, World, WorldError};
