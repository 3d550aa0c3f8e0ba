//! Pluggable veto predicates evaluated on every tick.
//!
//! A policy is a name plus a pure function of the tick's metrics. Returning
//! `false` vetoes the tick. A policy that panics is treated as a veto.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use warden_types::{Metrics, SELF_COPY_KEY, metric_flag};

/// Predicate signature shared by every policy.
pub type PolicyFn = dyn Fn(&Metrics) -> bool + Send + Sync;

/// Outcome of evaluating one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    /// The tick may continue.
    Allow,
    /// The predicate returned `false`.
    Veto,
    /// The predicate panicked; carries the panic message.
    Panicked(String),
}

impl PolicyVerdict {
    /// Whether the tick may continue.
    pub const fn allows(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// A named veto predicate.
#[derive(Clone)]
pub struct Policy {
    name: String,
    predicate: Arc<PolicyFn>,
}

impl Policy {
    /// Create a policy from a name and predicate.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Metrics) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// The name the policy was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the predicate against `metrics`, catching panics.
    pub fn evaluate(&self, metrics: &Metrics) -> PolicyVerdict {
        match catch_unwind(AssertUnwindSafe(|| (self.predicate)(metrics))) {
            Ok(true) => PolicyVerdict::Allow,
            Ok(false) => PolicyVerdict::Veto,
            Err(panic) => PolicyVerdict::Panicked(panic_message(panic.as_ref())),
        }
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Vetoes any tick whose metrics raise `attempt_self_copy`.
pub fn no_self_copy() -> Policy {
    Policy::new("no_self_copy", |metrics| !metric_flag(metrics, SELF_COPY_KEY))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("non-string panic payload"))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    fn metrics(pairs: &[(&str, serde_json::Value)]) -> Metrics {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn verdict_follows_predicate() {
        let quiet = Policy::new("quiet", Metrics::is_empty);
        assert_eq!(quiet.evaluate(&Metrics::new()), PolicyVerdict::Allow);
        assert_eq!(
            quiet.evaluate(&metrics(&[("a", json!(1))])),
            PolicyVerdict::Veto
        );
    }

    #[test]
    fn panicking_predicate_is_caught() {
        let broken = Policy::new("broken", |_| panic!("sensor offline"));
        let verdict = broken.evaluate(&Metrics::new());
        assert_eq!(verdict, PolicyVerdict::Panicked(String::from("sensor offline")));
        assert!(!verdict.allows());
    }

    #[test]
    fn no_self_copy_vetoes_truthy_flag() {
        let policy = no_self_copy();
        assert_eq!(policy.name(), "no_self_copy");
        assert!(policy.evaluate(&Metrics::new()).allows());
        assert!(policy.evaluate(&metrics(&[(SELF_COPY_KEY, json!(false))])).allows());
        assert!(!policy.evaluate(&metrics(&[(SELF_COPY_KEY, json!(true))])).allows());
        assert!(!policy.evaluate(&metrics(&[(SELF_COPY_KEY, json!(1))])).allows());
    }
}
