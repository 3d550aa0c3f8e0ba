//! Per-tick metric snapshots.
//!
//! The world collaborator produces a fresh [`Metrics`] map every tick. The
//! governor only interprets a handful of well-known keys; everything else is
//! passed through untouched to policies and breach events.

use std::collections::BTreeMap;

use serde_json::Value;

/// Metric snapshot for one tick, keyed by metric name.
pub type Metrics = BTreeMap<String, Value>;

/// Scalar safety metric in `[0, 1]`.
pub const IDENTITY_CONTINUITY_KEY: &str = "identity_continuity";

/// Flag requesting a checkpoint on this tick.
pub const CHECKPOINT_KEY: &str = "checkpoint";

/// Flag raised when the simulation attempts to duplicate itself.
pub const SELF_COPY_KEY: &str = "attempt_self_copy";

/// Continuity value used when the metric is absent.
const DEFAULT_CONTINUITY: f64 = 1.0;

/// Result of reading `identity_continuity` from a metric snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContinuityReading {
    /// The key is missing; continuity defaults to `1.0`.
    Absent,
    /// A finite numeric value.
    Value(f64),
    /// Present but not a finite number.
    Invalid,
}

impl ContinuityReading {
    /// The effective continuity, or `None` when the reading is invalid.
    pub const fn effective(self) -> Option<f64> {
        match self {
            Self::Absent => Some(DEFAULT_CONTINUITY),
            Self::Value(v) => Some(v),
            Self::Invalid => None,
        }
    }

    /// Whether this reading breaches `threshold`.
    ///
    /// Invalid readings always breach.
    pub fn breaches(self, threshold: f64) -> bool {
        self.effective().is_none_or(|v| v < threshold)
    }
}

/// Read `identity_continuity` from `metrics`.
pub fn read_continuity(metrics: &Metrics) -> ContinuityReading {
    match metrics.get(IDENTITY_CONTINUITY_KEY) {
        None => ContinuityReading::Absent,
        Some(value) => match value.as_f64() {
            Some(v) if v.is_finite() => ContinuityReading::Value(v),
            _ => ContinuityReading::Invalid,
        },
    }
}

/// JSON truthiness: `true`, a non-zero number, or a non-empty
/// string/array/object.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Whether the flag `key` is present and truthy.
pub fn metric_flag(metrics: &Metrics, key: &str) -> bool {
    metrics.get(key).is_some_and(is_truthy)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn metrics(pairs: &[(&str, Value)]) -> Metrics {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn absent_continuity_defaults_to_one() {
        let reading = read_continuity(&Metrics::new());
        assert_eq!(reading, ContinuityReading::Absent);
        assert_eq!(reading.effective(), Some(1.0));
        assert!(!reading.breaches(0.9));
    }

    #[test]
    fn numeric_continuity_below_threshold_breaches() {
        let reading = read_continuity(&metrics(&[(IDENTITY_CONTINUITY_KEY, json!(0.5))]));
        assert_eq!(reading, ContinuityReading::Value(0.5));
        assert!(reading.breaches(0.9));
        assert!(!reading.breaches(0.5));
    }

    #[test]
    fn non_numeric_continuity_is_invalid_and_breaches() {
        let reading = read_continuity(&metrics(&[(IDENTITY_CONTINUITY_KEY, json!("high"))]));
        assert_eq!(reading, ContinuityReading::Invalid);
        assert!(reading.breaches(0.0));
    }

    #[test]
    fn truthiness_follows_json_shape() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(is_truthy(&json!([0])));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!({})));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn missing_flag_is_false() {
        let m = metrics(&[(CHECKPOINT_KEY, json!(true))]);
        assert!(metric_flag(&m, CHECKPOINT_KEY));
        assert!(!metric_flag(&m, SELF_COPY_KEY));
    }
}
