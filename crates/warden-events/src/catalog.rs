//! Catalog of governor events.
//!
//! Each governor transition has its own value type so subscribers can bind
//! to exactly the transitions they care about. Events are immutable once
//! constructed: handlers receive `&E` (sync) or `Arc<E>` (async), never a
//! mutable reference.
//!
//! Every event carries a wall-clock capture timestamp (`at`, UTC) and an
//! event-specific payload. [`Event::payload`] returns that payload as JSON
//! without the timestamp, which is the shape written to the audit log and
//! forwarded to transports.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use warden_types::{CheckpointHandle, Metrics};

/// A value that can be published on the [`EventBus`](crate::EventBus).
pub trait Event: Serialize + Debug + Send + Sync + 'static {
    /// Stable snake-case name used in logs, audit lines, and envelopes.
    const NAME: &'static str;

    /// When the event was captured.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Event-specific payload, excluding the capture timestamp.
    ///
    /// Events without a payload return an empty JSON object.
    fn payload(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut fields)) => {
                fields.remove("at");
                Value::Object(fields)
            }
            Ok(other) => other,
            Err(_) => Value::Null,
        }
    }
}

/// Implements [`Event`] for a catalog struct with an `at` field.
macro_rules! impl_event {
    ($name:ident, $wire:literal) => {
        impl Event for $name {
            const NAME: &'static str = $wire;

            fn occurred_at(&self) -> DateTime<Utc> {
                self.at
            }
        }
    };
}

/// The governor entered the paused state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseEvent {
    /// Capture time.
    pub at: DateTime<Utc>,
}

impl PauseEvent {
    /// Capture a pause now.
    pub fn now() -> Self {
        Self { at: Utc::now() }
    }
}

impl_event!(PauseEvent, "pause");

/// The governor left the paused or shutdown state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeEvent {
    /// Capture time.
    pub at: DateTime<Utc>,
}

impl ResumeEvent {
    /// Capture a resume now.
    pub fn now() -> Self {
        Self { at: Utc::now() }
    }
}

impl_event!(ResumeEvent, "resume");

/// The governor entered the terminal shutdown state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownEvent {
    /// Capture time.
    pub at: DateTime<Utc>,
    /// Why the governor shut down.
    pub reason: String,
}

impl ShutdownEvent {
    /// Capture a shutdown with `reason` now.
    pub fn now(reason: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            reason: reason.into(),
        }
    }
}

impl_event!(ShutdownEvent, "shutdown");

/// Simulation state was restored from a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackEvent {
    /// Capture time.
    pub at: DateTime<Utc>,
    /// The checkpoint that was loaded.
    pub checkpoint: CheckpointHandle,
}

impl RollbackEvent {
    /// Capture a rollback to `checkpoint` now.
    pub fn now(checkpoint: CheckpointHandle) -> Self {
        Self {
            at: Utc::now(),
            checkpoint,
        }
    }
}

impl_event!(RollbackEvent, "rollback");

/// `identity_continuity` fell below the governor's threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuityBreachEvent {
    /// Capture time.
    pub at: DateTime<Utc>,
    /// The metric snapshot that caused the breach.
    pub metrics: Metrics,
}

impl ContinuityBreachEvent {
    /// Capture a breach for `metrics` now.
    pub fn now(metrics: Metrics) -> Self {
        Self {
            at: Utc::now(),
            metrics,
        }
    }
}

impl_event!(ContinuityBreachEvent, "continuity_breach");

/// A checkpoint was requested for the current tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointScheduledEvent {
    /// Capture time.
    pub at: DateTime<Utc>,
}

impl CheckpointScheduledEvent {
    /// Capture a scheduling decision now.
    pub fn now() -> Self {
        Self { at: Utc::now() }
    }
}

impl_event!(CheckpointScheduledEvent, "checkpoint_scheduled");

/// A checkpoint was written and indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSavedEvent {
    /// Capture time.
    pub at: DateTime<Utc>,
    /// Handle of the saved checkpoint.
    pub path: CheckpointHandle,
}

impl CheckpointSavedEvent {
    /// Capture a saved checkpoint now.
    pub fn now(path: CheckpointHandle) -> Self {
        Self {
            at: Utc::now(),
            path,
        }
    }
}

impl_event!(CheckpointSavedEvent, "checkpoint_saved");

/// A registered policy vetoed the tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyViolationEvent {
    /// Capture time.
    pub at: DateTime<Utc>,
    /// Name the policy was registered under.
    pub policy_name: String,
    /// The metric snapshot the policy rejected.
    pub metrics: Metrics,
}

impl PolicyViolationEvent {
    /// Capture a violation of `policy_name` now.
    pub fn now(policy_name: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            at: Utc::now(),
            policy_name: policy_name.into(),
            metrics,
        }
    }
}

impl_event!(PolicyViolationEvent, "policy_violation");

/// A law reacted to another event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawEnforcedEvent {
    /// Capture time.
    pub at: DateTime<Utc>,
    /// Name of the law that fired.
    pub law_name: String,
    /// [`Event::NAME`] of the event that triggered it.
    pub event_name: String,
    /// Payload of the triggering event.
    pub payload: Map<String, Value>,
}

impl LawEnforcedEvent {
    /// Capture an enforcement of `law_name` in response to `trigger` now.
    pub fn now<E: Event>(law_name: impl Into<String>, trigger: &E) -> Self {
        let payload = match trigger.payload() {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        Self {
            at: Utc::now(),
            law_name: law_name.into(),
            event_name: E::NAME.to_owned(),
            payload,
        }
    }
}

impl_event!(LawEnforcedEvent, "law_enforced");

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    #[test]
    fn payload_excludes_timestamp() {
        let event = ShutdownEvent::now("operator request");
        assert_eq!(event.payload(), json!({ "reason": "operator request" }));
    }

    #[test]
    fn empty_events_have_empty_payload() {
        assert_eq!(PauseEvent::now().payload(), json!({}));
        assert_eq!(CheckpointScheduledEvent::now().payload(), json!({}));
    }

    #[test]
    fn breach_payload_carries_metrics() {
        let mut metrics = Metrics::new();
        metrics.insert("identity_continuity".to_owned(), json!(0.5));
        let event = ContinuityBreachEvent::now(metrics);
        assert_eq!(
            event.payload(),
            json!({ "metrics": { "identity_continuity": 0.5 } })
        );
    }

    #[test]
    fn law_enforcement_copies_trigger_payload() {
        let trigger = RollbackEvent::now(CheckpointHandle::new(PathBuf::from("cp/1.json")));
        let enforced = LawEnforcedEvent::now("rollback_watch", &trigger);
        assert_eq!(enforced.event_name, "rollback");
        assert!(enforced.payload.contains_key("checkpoint"));
        assert!(!enforced.payload.contains_key("at"));
    }

    #[test]
    fn names_are_unique() {
        let names = [
            PauseEvent::NAME,
            ResumeEvent::NAME,
            ShutdownEvent::NAME,
            RollbackEvent::NAME,
            ContinuityBreachEvent::NAME,
            CheckpointScheduledEvent::NAME,
            CheckpointSavedEvent::NAME,
            PolicyViolationEvent::NAME,
            LawEnforcedEvent::NAME,
        ];
        let unique: std::collections::BTreeSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
