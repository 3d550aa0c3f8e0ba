//! The governor: sole authority over whether the world may advance.
//!
//! Each call to [`Governor::tick`] walks a fixed sequence:
//!
//! 1. Shutdown or paused: block.
//! 2. `identity_continuity` below the threshold: publish
//!    [`ContinuityBreachEvent`], roll back, block.
//! 3. Registered policies, in registration order. The first veto (or panic)
//!    publishes [`PolicyViolationEvent`], rolls back, and blocks without
//!    evaluating the rest.
//! 4. A truthy `checkpoint` metric saves and indexes a checkpoint. A failed
//!    save is logged and does not block.
//! 5. Allow.
//!
//! Every transition updates in-memory state first, then appends an audit
//! line, then publishes on the bus. An audit failure is logged and never
//! changes the verdict.
//!
//! # Single caller
//!
//! Every mutating method takes `&mut self`, so two ticks can never overlap
//! on one governor. Share it across tasks only behind a lock or, as the
//! runner does, by funnelling commands through a
//! [`ControlHandle`](crate::control::ControlHandle).

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use warden_events::{
    CheckpointSavedEvent, CheckpointScheduledEvent, ContinuityBreachEvent, Event, EventBus,
    PauseEvent, PolicyViolationEvent, ResumeEvent, RollbackEvent, ShutdownEvent,
};
use warden_types::{
    AuditEntry, CHECKPOINT_KEY, CheckpointHandle, GovernorPhase, GovernorStatus, Metrics,
    metric_flag, read_continuity,
};

use crate::audit::AuditTrail;
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::policy::{Policy, PolicyVerdict};
use crate::world::World;

/// Shutdown reason used when a rollback finds nothing to restore.
pub const NO_SAFE_CHECKPOINT: &str = "No safe checkpoint available";

/// Errors raised when constructing a governor.
#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    /// The continuity threshold is not a finite value in `[0, 1]`.
    #[error("continuity threshold {value} is outside [0, 1]")]
    InvalidThreshold {
        /// The rejected threshold.
        value: f64,
    },
}

/// Supervisory control loop state.
pub struct Governor {
    bus: Arc<EventBus>,
    store: Box<dyn CheckpointStore>,
    audit: Box<dyn AuditTrail>,
    continuity_threshold: f64,
    policies: Vec<Policy>,
    paused: bool,
    shutdown: bool,
    shutdown_reason: Option<String>,
    ticks_evaluated: u64,
    ticks_allowed: u64,
    rollbacks: u64,
}

impl Governor {
    /// Create a running governor.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::InvalidThreshold`] if
    /// `continuity_threshold` is not finite or lies outside `[0, 1]`.
    pub fn new(
        bus: Arc<EventBus>,
        store: Box<dyn CheckpointStore>,
        audit: Box<dyn AuditTrail>,
        continuity_threshold: f64,
    ) -> Result<Self, GovernorError> {
        if !continuity_threshold.is_finite() || !(0.0..=1.0).contains(&continuity_threshold) {
            return Err(GovernorError::InvalidThreshold {
                value: continuity_threshold,
            });
        }
        Ok(Self {
            bus,
            store,
            audit,
            continuity_threshold,
            policies: Vec::new(),
            paused: false,
            shutdown: false,
            shutdown_reason: None,
            ticks_evaluated: 0,
            ticks_allowed: 0,
            rollbacks: 0,
        })
    }

    /// Append a policy. Policies run in registration order; duplicates are
    /// kept.
    pub fn register_policy(&mut self, policy: Policy) {
        info!(policy = policy.name(), "Policy registered");
        self.policies.push(policy);
    }

    // -----------------------------------------------------------------------
    // Administrative transitions
    // -----------------------------------------------------------------------

    /// Block ticks until [`resume`](Self::resume).
    ///
    /// Pausing twice publishes two [`PauseEvent`]s.
    pub fn pause(&mut self) {
        self.paused = true;
        info!("Governor paused");
        self.emit(PauseEvent::now());
    }

    /// Clear the pause flag and, administratively, a prior shutdown.
    pub fn resume(&mut self) {
        if self.shutdown {
            warn!(
                reason = self.shutdown_reason.as_deref().unwrap_or_default(),
                "Clearing shutdown by administrative resume"
            );
        }
        self.paused = false;
        self.shutdown = false;
        self.shutdown_reason = None;
        info!("Governor resumed");
        self.emit(ResumeEvent::now());
    }

    /// Enter the terminal shutdown state.
    ///
    /// The caller must stop advancing the world; every later
    /// [`tick`](Self::tick) returns `false` until an explicit
    /// [`resume`](Self::resume).
    pub fn shutdown(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.shutdown = true;
        self.shutdown_reason = Some(reason.clone());
        error!(%reason, "Governor shut down");
        self.emit(ShutdownEvent::now(reason));
    }

    // -----------------------------------------------------------------------
    // Tick evaluation
    // -----------------------------------------------------------------------

    /// Decide whether `world` may advance on this tick.
    pub fn tick(&mut self, world: &mut dyn World, metrics: &Metrics) -> bool {
        if self.shutdown {
            debug!("Tick blocked: shut down");
            return false;
        }
        if self.paused {
            debug!("Tick blocked: paused");
            return false;
        }
        self.ticks_evaluated = self.ticks_evaluated.saturating_add(1);

        let continuity = read_continuity(metrics);
        if continuity.breaches(self.continuity_threshold) {
            warn!(
                continuity = ?continuity,
                threshold = self.continuity_threshold,
                "Continuity breach"
            );
            self.emit(ContinuityBreachEvent::now(metrics.clone()));
            self.rollback(world, None);
            return false;
        }

        if let Some(policy_name) = self.first_veto(metrics) {
            self.emit(PolicyViolationEvent::now(policy_name, metrics.clone()));
            self.rollback(world, None);
            return false;
        }

        if metric_flag(metrics, CHECKPOINT_KEY) {
            let _ = self.checkpoint(world);
        }

        self.ticks_allowed = self.ticks_allowed.saturating_add(1);
        true
    }

    /// Name of the first policy that vetoes `metrics`, short-circuiting.
    fn first_veto(&self, metrics: &Metrics) -> Option<String> {
        self.policies.iter().find_map(|policy| match policy.evaluate(metrics) {
            PolicyVerdict::Allow => None,
            PolicyVerdict::Veto => {
                warn!(policy = policy.name(), "Policy vetoed tick");
                Some(policy.name().to_owned())
            }
            PolicyVerdict::Panicked(message) => {
                error!(policy = policy.name(), %message, "Policy panicked, treating as veto");
                Some(policy.name().to_owned())
            }
        })
    }

    /// Save the world's state, index it, and announce it.
    ///
    /// Returns `None` when the save failed; the failure is logged and
    /// recorded in the audit trail.
    pub fn checkpoint(&mut self, world: &dyn World) -> Option<CheckpointHandle> {
        self.emit(CheckpointScheduledEvent::now());
        match self.save_checkpoint(world) {
            Ok(handle) => {
                info!(checkpoint = %handle, "Checkpoint saved");
                self.emit(CheckpointSavedEvent::now(handle.clone()));
                Some(handle)
            }
            Err(err) => {
                warn!(error = %err, "Checkpoint save failed, continuing without one");
                self.record(AuditEntry::now(
                    "checkpoint_failed",
                    Some(json!({ "error": err.to_string() })),
                ));
                None
            }
        }
    }

    fn save_checkpoint(&mut self, world: &dyn World) -> Result<CheckpointHandle, CheckpointError> {
        let state = world.save_state()?;
        let handle = self.store.save(&state)?;
        self.store.register(&handle)?;
        Ok(handle)
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Restore `world` from `target`, or from the latest checkpoint.
    ///
    /// With no checkpoint to restore, or if loading fails, the governor
    /// shuts down. Returns whether the rollback completed.
    pub fn rollback(&mut self, world: &mut dyn World, target: Option<CheckpointHandle>) -> bool {
        let handle = match target {
            Some(handle) => handle,
            None => match self.store.latest() {
                Ok(Some(handle)) => handle,
                Ok(None) => {
                    self.shutdown(NO_SAFE_CHECKPOINT);
                    return false;
                }
                Err(err) => {
                    error!(error = %err, "Checkpoint store unavailable during rollback");
                    self.shutdown(NO_SAFE_CHECKPOINT);
                    return false;
                }
            },
        };

        let restored = self
            .store
            .load(&handle)
            .and_then(|state| world.load_state(state).map_err(CheckpointError::from));
        if let Err(err) = restored {
            error!(checkpoint = %handle, error = %err, "Checkpoint load failed");
            self.shutdown(format!("Checkpoint load failed: {err}"));
            return false;
        }

        world.mark_rollback(&handle);
        self.rollbacks = self.rollbacks.saturating_add(1);
        info!(checkpoint = %handle, "Rolled back");
        self.emit(RollbackEvent::now(handle));
        true
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Whether the pause flag is set.
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the governor is shut down.
    pub const fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Reason recorded by the active shutdown.
    pub fn shutdown_reason(&self) -> Option<&str> {
        self.shutdown_reason.as_deref()
    }

    /// Continuity threshold in effect.
    pub const fn continuity_threshold(&self) -> f64 {
        self.continuity_threshold
    }

    /// The bus this governor publishes on.
    pub const fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Coarse state; shutdown takes precedence over pause.
    pub const fn phase(&self) -> GovernorPhase {
        if self.shutdown {
            GovernorPhase::Shutdown
        } else if self.paused {
            GovernorPhase::Paused
        } else {
            GovernorPhase::Running
        }
    }

    /// Snapshot for operators.
    pub fn status(&self) -> GovernorStatus {
        GovernorStatus {
            phase: self.phase(),
            paused: self.paused,
            shutdown: self.shutdown,
            shutdown_reason: self.shutdown_reason.clone(),
            continuity_threshold: self.continuity_threshold,
            policies: self.policies.iter().map(|p| p.name().to_owned()).collect(),
            ticks_evaluated: self.ticks_evaluated,
            ticks_allowed: self.ticks_allowed,
            rollbacks: self.rollbacks,
        }
    }

    // -----------------------------------------------------------------------
    // Audit then publish
    // -----------------------------------------------------------------------

    fn emit<E: Event>(&mut self, event: E) {
        let payload = match event.payload() {
            Value::Object(fields) if fields.is_empty() => None,
            Value::Null => None,
            other => Some(other),
        };
        self.record(AuditEntry::at(event.occurred_at(), E::NAME, payload));

        let report = self.bus.publish(event);
        if report.failed > 0 {
            warn!(event = E::NAME, failed = report.failed, "Some subscribers failed");
        }
    }

    fn record(&mut self, entry: AuditEntry) {
        if let Err(err) = self.audit.record(&entry) {
            error!(event = %entry.event, error = %err, "Audit write failed");
        }
    }
}

impl core::fmt::Debug for Governor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Governor")
            .field("phase", &self.phase())
            .field("continuity_threshold", &self.continuity_threshold)
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

