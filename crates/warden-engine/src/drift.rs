//! Demonstration world whose identity slowly drifts.
//!
//! Each step erodes `identity_continuity` by a small random amount and
//! occasionally lets it recover. Every `checkpoint_every` ticks the world
//! raises the `checkpoint` flag, and it rarely attempts a self copy, which
//! the `no_self_copy` policy vetoes. Left alone, continuity eventually
//! falls below the governor's threshold and the world is rolled back.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use warden_core::{World, WorldError};
use warden_types::{CHECKPOINT_KEY, CheckpointHandle, IDENTITY_CONTINUITY_KEY, Metrics, SELF_COPY_KEY};

/// Largest continuity loss per unit of `dt`.
const MAX_EROSION: f64 = 0.02;

/// Chance per step that continuity partly recovers.
const RECOVERY_CHANCE: f64 = 0.25;

/// Continuity regained on recovery.
const RECOVERY: f64 = 0.03;

/// Chance per tick that the world attempts to copy itself.
const SELF_COPY_CHANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct DriftState {
    tick: u64,
    continuity: f64,
}

/// A seeded random-walk world.
#[derive(Debug)]
pub struct DriftWorld {
    rng: StdRng,
    state: DriftState,
    checkpoint_every: u64,
    rollbacks: u64,
}

impl DriftWorld {
    /// Create a fully coherent world.
    pub fn new(seed: u64, checkpoint_every: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            state: DriftState {
                tick: 0,
                continuity: 1.0,
            },
            checkpoint_every,
            rollbacks: 0,
        }
    }

    /// Ticks advanced since the last restore.
    pub const fn tick(&self) -> u64 {
        self.state.tick
    }

    /// Current `identity_continuity`.
    pub const fn continuity(&self) -> f64 {
        self.state.continuity
    }

    /// Rollbacks applied to this world.
    pub const fn rollbacks(&self) -> u64 {
        self.rollbacks
    }

    fn checkpoint_due(&self) -> bool {
        self.state.tick > 0 && self.state.tick.checked_rem(self.checkpoint_every) == Some(0)
    }
}

impl World for DriftWorld {
    fn collect_metrics(&mut self) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert(
            IDENTITY_CONTINUITY_KEY.to_owned(),
            json!(self.state.continuity),
        );
        metrics.insert(CHECKPOINT_KEY.to_owned(), json!(self.checkpoint_due()));
        metrics.insert(
            SELF_COPY_KEY.to_owned(),
            json!(self.rng.random_bool(SELF_COPY_CHANCE)),
        );
        metrics.insert(String::from("tick"), json!(self.state.tick));
        metrics
    }

    fn step(&mut self, dt: f64) {
        let erosion = self.rng.random_range(0.0..MAX_EROSION) * dt;
        let mut continuity = self.state.continuity - erosion;
        if self.rng.random_bool(RECOVERY_CHANCE) {
            continuity += RECOVERY;
        }
        self.state.continuity = continuity.clamp(0.0, 1.0);
        self.state.tick = self.state.tick.saturating_add(1);
    }

    fn save_state(&self) -> Result<Value, WorldError> {
        Ok(serde_json::to_value(self.state)?)
    }

    fn load_state(&mut self, state: Value) -> Result<(), WorldError> {
        let restored: DriftState = serde_json::from_value(state)?;
        if !restored.continuity.is_finite() {
            return Err(WorldError::Rejected {
                message: format!("continuity {} is not finite", restored.continuity),
            });
        }
        self.state = restored;
        Ok(())
    }

    fn mark_rollback(&mut self, checkpoint: &CheckpointHandle) {
        self.rollbacks = self.rollbacks.saturating_add(1);
        tracing::info!(
            checkpoint = %checkpoint,
            tick = self.state.tick,
            continuity = self.state.continuity,
            "Drift world restored"
        );
    }
}
