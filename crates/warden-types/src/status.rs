//! Governor phase and status snapshot.

use serde::{Deserialize, Serialize};

/// Coarse state of the governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernorPhase {
    /// Ticks are evaluated normally.
    Running,
    /// Ticks are blocked until resumed.
    Paused,
    /// Terminal for this process until an administrative resume.
    Shutdown,
}

/// JSON-serializable view of the governor for operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorStatus {
    /// Current phase.
    pub phase: GovernorPhase,
    /// Whether the pause flag is set.
    pub paused: bool,
    /// Whether the shutdown flag is set.
    pub shutdown: bool,
    /// Reason recorded by the most recent shutdown, if any.
    pub shutdown_reason: Option<String>,
    /// Continuity threshold below which ticks are rolled back.
    pub continuity_threshold: f64,
    /// Names of registered policies, in evaluation order.
    pub policies: Vec<String>,
    /// Number of ticks evaluated (including blocked ones).
    pub ticks_evaluated: u64,
    /// Number of ticks that were allowed to advance.
    pub ticks_allowed: u64,
    /// Number of completed rollbacks.
    pub rollbacks: u64,
}
