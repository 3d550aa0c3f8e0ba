//! Supervised world loop.
//!
//! [`run_world`] drives a [`World`] one tick at a time under a
//! [`Governor`]:
//!
//! - **Commands first**: every queued [`GovernorCommand`] is applied before
//!   the next tick is evaluated.
//! - **Shutdown stops the loop**: once the governor is shut down the run
//!   ends.
//! - **Pause blocks**: while paused the loop waits for the next command
//!   instead of spinning.
//! - **Bounded runs**: `max_ticks` caps the number of evaluated ticks.
//!
//! [`GovernorCommand`]: crate::control::GovernorCommand

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::control::{CommandReceiver, Pending, apply_command};
use crate::governor::Governor;
use crate::world::World;

/// Errors that prevent a run from starting.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The configured step is not a positive finite number.
    #[error("invalid step size {dt}: must be a positive finite number")]
    InvalidStep {
        /// The rejected step.
        dt: f64,
    },
}

/// Reason the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEndReason {
    /// The governor shut down.
    Shutdown {
        /// The governor's shutdown reason.
        reason: String,
    },
    /// `max_ticks` ticks were evaluated.
    MaxTicksReached,
    /// The governor was paused and no control handle remained to resume it.
    ControlClosed,
}

/// Outcome of [`run_world`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Why the loop stopped.
    pub end_reason: RunEndReason,
    /// Ticks the governor evaluated.
    pub ticks: u64,
    /// Ticks the world advanced.
    pub advanced: u64,
    /// Ticks the governor blocked.
    pub blocked: u64,
}

/// Run `world` under `governor` until a stop condition is met.
///
/// # Errors
///
/// Returns [`RunnerError::InvalidStep`] if `config.dt` is not a positive
/// finite number.
pub async fn run_world(
    governor: &mut Governor,
    world: &mut dyn World,
    commands: &mut CommandReceiver,
    config: &RunnerConfig,
) -> Result<RunSummary, RunnerError> {
    if !config.dt.is_finite() || config.dt <= 0.0 {
        return Err(RunnerError::InvalidStep { dt: config.dt });
    }

    let interval = Duration::from_millis(config.tick_interval_ms);
    let mut ticks: u64 = 0;
    let mut advanced: u64 = 0;
    let mut blocked: u64 = 0;
    let mut control_open = true;

    info!(
        max_ticks = config.max_ticks,
        tick_interval_ms = config.tick_interval_ms,
        dt = config.dt,
        "World loop starting"
    );

    let end_reason = loop {
        // --- Drain commands ---
        while control_open {
            match commands.try_next() {
                Pending::Command(command) => apply_command(governor, world, command),
                Pending::Empty => break,
                Pending::Closed => {
                    debug!("Control channel closed");
                    control_open = false;
                }
            }
        }

        if let Some(reason) = governor.shutdown_reason() {
            break RunEndReason::Shutdown {
                reason: reason.to_owned(),
            };
        }

        if config.max_ticks > 0 && ticks >= config.max_ticks {
            info!(ticks, max_ticks = config.max_ticks, "Tick limit reached");
            break RunEndReason::MaxTicksReached;
        }

        // --- Wait out a pause ---
        if governor.is_paused() {
            if !control_open {
                warn!("Paused with no control handle left to resume");
                break RunEndReason::ControlClosed;
            }
            info!("World paused, waiting for a command");
            match commands.next().await {
                Some(command) => apply_command(governor, world, command),
                None => control_open = false,
            }
            continue;
        }

        // --- Evaluate and advance ---
        let metrics = world.collect_metrics();
        ticks = ticks.saturating_add(1);
        if governor.tick(world, &metrics) {
            world.step(config.dt);
            advanced = advanced.saturating_add(1);
        } else {
            blocked = blocked.saturating_add(1);
            debug!(tick = ticks, "Tick blocked");
        }

        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    };

    let summary = RunSummary {
        end_reason,
        ticks,
        advanced,
        blocked,
    };
    info!(
        reason = ?summary.end_reason,
        ticks = summary.ticks,
        advanced = summary.advanced,
        blocked = summary.blocked,
        "World loop ended"
    );
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn summary_serializes_with_kind_tag() {
        let summary = RunSummary {
            end_reason: RunEndReason::Shutdown {
                reason: String::from("No safe checkpoint available"),
            },
            ticks: 4,
            advanced: 3,
            blocked: 1,
        };

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            value["end_reason"],
            json!({ "kind": "shutdown", "reason": "No safe checkpoint available" })
        );
        let back: RunSummary = serde_json::from_value(value).unwrap();
        assert_eq!(back, summary);
    }

    #[test]
    fn unit_reasons_serialize_as_kind_only() {
        let value = serde_json::to_value(RunEndReason::MaxTicksReached).unwrap();
        assert_eq!(value, json!({ "kind": "max_ticks_reached" }));
        assert_eq!(
            serde_json::from_value::<RunEndReason>(json!({ "kind": "control_closed" })).unwrap(),
            RunEndReason::ControlClosed
        );
    }
}
