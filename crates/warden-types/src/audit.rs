//! Audit log record shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of the JSON-lines audit log.
///
/// Serialized as `{"t": <seconds>, "event": <name>, "payload": <any|null>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Wall-clock seconds since the Unix epoch, with sub-second precision.
    pub t: f64,
    /// Name of the governor action.
    pub event: String,
    /// Action-specific payload.
    pub payload: Option<Value>,
}

impl AuditEntry {
    /// Create an entry stamped with the current time.
    pub fn now(event: &str, payload: Option<Value>) -> Self {
        Self::at(Utc::now(), event, payload)
    }

    /// Create an entry stamped with `at`.
    #[allow(clippy::cast_precision_loss)]
    pub fn at(at: DateTime<Utc>, event: &str, payload: Option<Value>) -> Self {
        let micros = at.timestamp_micros() as f64;
        Self {
            t: micros / 1_000_000.0,
            event: event.to_owned(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_with_short_keys() {
        let entry = AuditEntry::now("pause", None);
        let value = serde_json::to_value(&entry).unwrap_or(Value::Null);
        assert_eq!(value["event"], json!("pause"));
        assert_eq!(value["payload"], Value::Null);
        assert!(value["t"].as_f64().is_some_and(|t| t > 0.0));
    }
}
