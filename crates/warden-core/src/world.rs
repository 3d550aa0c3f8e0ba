//! The simulation collaborator supervised by the governor.
//!
//! The governor never decides what the simulation does. It only reads the
//! metrics a [`World`] reports, tells the loop whether to advance, and
//! asks the world to export or replace its state around checkpoints.
//!
//! [`ScriptedWorld`] replays a fixed sequence of metric snapshots, which
//! allows the governor and runner to be exercised without a real
//! simulation behind them.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use warden_types::{CheckpointHandle, IDENTITY_CONTINUITY_KEY, Metrics};

/// Errors a world reports when exporting or restoring state.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// State could not be converted to or from JSON.
    #[error("world state serialization failed: {source}")]
    Serialization {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },

    /// The world rejected the operation.
    #[error("world rejected state: {message}")]
    Rejected {
        /// Description of the failure.
        message: String,
    },
}

/// A simulation the governor can supervise.
pub trait World: Send {
    /// Capture the metrics for the upcoming tick.
    ///
    /// Should include `identity_continuity`; may include `checkpoint`,
    /// `attempt_self_copy`, or any flag a registered policy reads.
    fn collect_metrics(&mut self) -> Metrics;

    /// Advance the simulation by `dt`.
    fn step(&mut self, dt: f64);

    /// Export the live state for a checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] if the state cannot be captured.
    fn save_state(&self) -> Result<Value, WorldError>;

    /// Replace the live state with a checkpointed one.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError`] if the state is unreadable. The governor
    /// treats this as fatal.
    fn load_state(&mut self, state: Value) -> Result<(), WorldError>;

    /// Record that a rollback to `checkpoint` happened.
    fn mark_rollback(&mut self, checkpoint: &CheckpointHandle) {
        let _ = checkpoint;
    }
}

/// State exported by [`ScriptedWorld`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
struct ScriptedState {
    steps: u64,
    elapsed: f64,
}

/// Deterministic [`World`] that replays queued metric snapshots.
///
/// Once the script is exhausted every tick reports
/// `identity_continuity = 1.0`.
#[derive(Debug, Default)]
pub struct ScriptedWorld {
    script: VecDeque<Metrics>,
    state: ScriptedState,
    rollbacks: Vec<CheckpointHandle>,
    reject_loads: bool,
}

impl ScriptedWorld {
    /// Create a world with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one metric snapshot.
    pub fn push(&mut self, metrics: Metrics) -> &mut Self {
        self.script.push_back(metrics);
        self
    }

    /// Queue a snapshot from `(key, value)` pairs.
    pub fn push_pairs(&mut self, pairs: &[(&str, Value)]) -> &mut Self {
        let metrics = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        self.push(metrics)
    }

    /// Make every later [`World::load_state`] call fail.
    pub const fn reject_loads(&mut self, reject: bool) {
        self.reject_loads = reject;
    }

    /// Number of times [`World::step`] ran.
    pub const fn steps(&self) -> u64 {
        self.state.steps
    }

    /// Sum of every `dt` passed to [`World::step`].
    pub const fn elapsed(&self) -> f64 {
        self.state.elapsed
    }

    /// Checkpoints this world was rolled back to, oldest first.
    pub fn rollbacks(&self) -> &[CheckpointHandle] {
        &self.rollbacks
    }
}

impl World for ScriptedWorld {
    fn collect_metrics(&mut self) -> Metrics {
        self.script.pop_front().unwrap_or_else(|| {
            let mut healthy = Metrics::new();
            healthy.insert(IDENTITY_CONTINUITY_KEY.to_owned(), json!(1.0));
            healthy
        })
    }

    fn step(&mut self, dt: f64) {
        self.state.steps = self.state.steps.saturating_add(1);
        self.state.elapsed += dt;
    }

    fn save_state(&self) -> Result<Value, WorldError> {
        Ok(serde_json::to_value(self.state)?)
    }

    fn load_state(&mut self, state: Value) -> Result<(), WorldError> {
        if self.reject_loads {
            return Err(WorldError::Rejected {
                message: String::from("loads disabled"),
            });
        }
        self.state = serde_json::from_value(state)?;
        Ok(())
    }

    fn mark_rollback(&mut self, checkpoint: &CheckpointHandle) {
        self.rollbacks.push(checkpoint.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_script_reports_healthy_metrics() {
        let mut world = ScriptedWorld::new();
        world.push_pairs(&[(IDENTITY_CONTINUITY_KEY, json!(0.2))]);
        assert_eq!(world.collect_metrics()[IDENTITY_CONTINUITY_KEY], json!(0.2));
        assert_eq!(world.collect_metrics()[IDENTITY_CONTINUITY_KEY], json!(1.0));
    }

    #[test]
    fn state_survives_save_and_load() {
        let mut world = ScriptedWorld::new();
        world.step(0.5);
        let saved = world.save_state().unwrap();
        world.step(0.5);
        world.step(0.5);
        assert_eq!(world.steps(), 3);

        world.load_state(saved).unwrap();
        assert_eq!(world.steps(), 1);
        assert_eq!(world.elapsed(), 0.5);
    }

    #[test]
    fn malformed_state_is_rejected() {
        let mut world = ScriptedWorld::new();
        let err = world.load_state(json!({ "steps": "many" })).unwrap_err();
        assert!(matches!(err, WorldError::Serialization { .. }));
    }

    #[test]
    fn disabled_loads_fail() {
        let mut world = ScriptedWorld::new();
        let saved = world.save_state().unwrap();
        world.reject_loads(true);
        assert!(matches!(
            world.load_state(saved),
            Err(WorldError::Rejected { .. })
        ));
    }
}
