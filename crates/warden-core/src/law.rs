//! Laws: standing reactions to governor events.
//!
//! A [`Law`] binds a name to one catalog event type and a [`LawAction`].
//! Each time a matching event is published the law announces itself with a
//! [`LawEnforcedEvent`] and forwards its action to the governor as a
//! [`GovernorCommand`](crate::control::GovernorCommand). Laws subscribe at
//! [`Priority::High`], so they fire before ordinary subscribers see the
//! triggering event.
//!
//! Every enforcement is appended to the audit trail before it is
//! published, like any governor transition.
//!
//! Actions are queued, not applied inline: the governor is busy with the
//! tick that produced the event, and the runner applies the command before
//! the next one.

use std::any::TypeId;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use warden_events::{
    Event, EventBus, HandlerError, HandlerResult, LawEnforcedEvent, Priority, Subscriber,
    Subscriptions,
};
use warden_types::AuditEntry;

use crate::audit::AuditTrail;
use crate::control::{ControlClosed, ControlHandle};

type SharedTrail = Arc<Mutex<Box<dyn AuditTrail>>>;

/// What a law asks the governor to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LawAction {
    /// Only announce the enforcement.
    Observe,
    /// Pause the governor.
    Pause,
    /// Shut the governor down.
    Shutdown {
        /// Shutdown reason.
        reason: String,
    },
    /// Roll back to the latest checkpoint.
    Rollback,
}

type Binder = fn(&EventBus, Arc<Enforcement>, &mut Subscriptions);

/// A named reaction to one event type.
#[derive(Debug, Clone)]
pub struct Law {
    name: String,
    event_name: &'static str,
    action: LawAction,
    bind: Binder,
}

impl Law {
    /// A law that reacts to every published `E`.
    pub fn on<E: Event>(name: impl Into<String>, action: LawAction) -> Self {
        Self {
            name: name.into(),
            event_name: E::NAME,
            action,
            bind: bind::<E>,
        }
    }

    /// The law's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the event type the law reacts to.
    pub const fn event_name(&self) -> &'static str {
        self.event_name
    }

    /// The action forwarded on each enforcement.
    pub const fn action(&self) -> &LawAction {
        &self.action
    }
}

/// Per-law state captured by its handler.
struct Enforcement {
    law_name: String,
    action: LawAction,
    control: ControlHandle,
    bus: Weak<EventBus>,
    audit: SharedTrail,
}

impl Enforcement {
    fn enforce<E: Event>(&self, event: &E) -> HandlerResult {
        info!(
            law = %self.law_name,
            event = E::NAME,
            action = ?self.action,
            "Law enforced"
        );

        // A law watching enforcements must not feed itself.
        let feeds_itself = TypeId::of::<E>() == TypeId::of::<LawEnforcedEvent>();
        if let Some(bus) = self.bus.upgrade().filter(|_| !feeds_itself) {
            let enforced = LawEnforcedEvent::now(self.law_name.clone(), event);
            self.record(&enforced);
            let report = bus.publish(enforced);
            if report.failed > 0 {
                warn!(
                    law = %self.law_name,
                    failed = report.failed,
                    "Some subscribers failed on law enforcement"
                );
            }
        }

        self.forward()
            .map_err(|err| HandlerError::failed(format!("law {}: {err}", self.law_name)))
    }

    fn record(&self, enforced: &LawEnforcedEvent) {
        let entry = AuditEntry::at(
            enforced.occurred_at(),
            LawEnforcedEvent::NAME,
            Some(enforced.payload()),
        );
        let mut trail = self.audit.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = trail.record(&entry) {
            error!(law = %self.law_name, error = %err, "Audit write failed");
        }
    }

    fn forward(&self) -> Result<(), ControlClosed> {
        match &self.action {
            LawAction::Observe => Ok(()),
            LawAction::Pause => self.control.pause(),
            LawAction::Shutdown { reason } => self.control.shutdown(reason.clone()),
            LawAction::Rollback => self.control.rollback(None),
        }
    }
}

fn bind<E: Event>(bus: &EventBus, enforcement: Arc<Enforcement>, subs: &mut Subscriptions) {
    let id = bus.subscribe::<E, _>(Priority::High, move |event| enforcement.enforce(event));
    subs.push::<E>(id);
}

/// The set of laws in force, wired onto the bus as one [`Subscriber`].
pub struct LawBook {
    laws: Vec<Law>,
    control: ControlHandle,
    bus: Weak<EventBus>,
    audit: SharedTrail,
}

impl LawBook {
    /// An empty law book publishing on `bus`, commanding through
    /// `control`, and recording enforcements in `audit`.
    pub fn new(bus: &Arc<EventBus>, control: ControlHandle, audit: Box<dyn AuditTrail>) -> Self {
        Self {
            laws: Vec::new(),
            control,
            bus: Arc::downgrade(bus),
            audit: Arc::new(Mutex::new(audit)),
        }
    }

    /// Add `law`.
    #[must_use]
    pub fn enact(mut self, law: Law) -> Self {
        self.laws.push(law);
        self
    }

    /// Laws in enactment order.
    pub fn laws(&self) -> &[Law] {
        &self.laws
    }
}

impl Subscriber for LawBook {
    fn attach(self: Arc<Self>, bus: &EventBus) -> Subscriptions {
        let mut subs = Subscriptions::new();
        for law in &self.laws {
            let enforcement = Arc::new(Enforcement {
                law_name: law.name.clone(),
                action: law.action.clone(),
                control: self.control.clone(),
                bus: self.bus.clone(),
                audit: Arc::clone(&self.audit),
            });
            (law.bind)(bus, enforcement, &mut subs);
            info!(law = %law.name, event = law.event_name, "Law enacted");
        }
        subs
    }
}

impl core::fmt::Debug for LawBook {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LawBook")
            .field("laws", &self.laws)
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::sync::Mutex;

    use warden_events::{ContinuityBreachEvent, PauseEvent, ShutdownEvent};
    use warden_types::Metrics;

    use super::*;
    use crate::audit::{AuditError, MemoryAuditTrail};
    use crate::control::{GovernorCommand, Pending, control_channel};

    #[test]
    fn law_announces_and_forwards_its_action() {
        let bus = Arc::new(EventBus::new());
        let (control, mut commands) = control_channel();
        let book = LawBook::new(&bus, control, Box::new(MemoryAuditTrail::new())).enact(
            Law::on::<ContinuityBreachEvent>(
                "halt_on_breach",
                LawAction::Shutdown {
                    reason: String::from("continuity law"),
                },
            ),
        );
        let subs = bus.attach(Arc::new(book));
        assert_eq!(subs.len(), 1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe::<LawEnforcedEvent, _>(Priority::Normal, move |event| {
            sink.lock()
                .unwrap()
                .push((event.law_name.clone(), event.event_name.clone()));
            Ok(())
        });

        let _ = bus.publish(ContinuityBreachEvent::now(Metrics::new()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(String::from("halt_on_breach"), String::from("continuity_breach"))]
        );
        assert_eq!(
            commands.try_next(),
            Pending::Command(GovernorCommand::Shutdown {
                reason: String::from("continuity law")
            })
        );
    }

    #[test]
    fn law_runs_before_normal_subscribers() {
        let bus = Arc::new(EventBus::new());
        let (control, mut commands) = control_channel();
        let order = Arc::new(Mutex::new(Vec::new()));

        let normal = Arc::clone(&order);
        bus.subscribe::<PauseEvent, _>(Priority::Normal, move |_| {
            normal.lock().unwrap().push("normal");
            Ok(())
        });
        let enforced = Arc::clone(&order);
        bus.subscribe::<LawEnforcedEvent, _>(Priority::Normal, move |_| {
            enforced.lock().unwrap().push("law");
            Ok(())
        });
        let _subs = bus.attach(Arc::new(
            LawBook::new(&bus, control, Box::new(MemoryAuditTrail::new()))
                .enact(Law::on::<PauseEvent>("watch", LawAction::Observe)),
        ));

        let _ = bus.publish(PauseEvent::now());
        assert_eq!(*order.lock().unwrap(), vec!["law", "normal"]);
        assert_eq!(commands.try_next(), Pending::Empty);
    }

    #[test]
    fn law_on_enforcements_does_not_recurse() {
        let bus = Arc::new(EventBus::new());
        let (control, mut commands) = control_channel();
        let _subs = bus.attach(Arc::new(
            LawBook::new(&bus, control, Box::new(MemoryAuditTrail::new()))
                .enact(Law::on::<ShutdownEvent>("echo", LawAction::Observe))
                .enact(Law::on::<LawEnforcedEvent>("meta", LawAction::Pause)),
        ));

        let report = bus.publish(ShutdownEvent::now("drill"));
        assert_eq!(report.failed, 0);
        assert_eq!(commands.try_next(), Pending::Command(GovernorCommand::Pause));
        assert_eq!(commands.try_next(), Pending::Empty);
    }

    #[test]
    fn closed_control_channel_is_a_handler_failure() {
        let bus = Arc::new(EventBus::new());
        let (control, commands) = control_channel();
        drop(commands);
        let _subs = bus.attach(Arc::new(
            LawBook::new(&bus, control, Box::new(MemoryAuditTrail::new()))
                .enact(Law::on::<PauseEvent>("stop", LawAction::Rollback)),
        ));

        let report = bus.publish(PauseEvent::now());
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn enforcement_is_audited_before_publication() {
        let bus = Arc::new(EventBus::new());
        let (control, _commands) = control_channel();
        let trail = MemoryAuditTrail::new();
        let _subs = bus.attach(Arc::new(
            LawBook::new(&bus, control, Box::new(trail.clone()))
                .enact(Law::on::<ShutdownEvent>("shutdown_watch", LawAction::Observe)),
        ));

        let seen_at_publish = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen_at_publish);
        let observer = trail.clone();
        bus.subscribe::<LawEnforcedEvent, _>(Priority::Normal, move |_| {
            sink.lock().unwrap().extend(observer.events());
            Ok(())
        });

        let _ = bus.publish(ShutdownEvent::now("drill"));

        assert_eq!(*seen_at_publish.lock().unwrap(), vec!["law_enforced"]);
        let entries = trail.entries();
        assert_eq!(entries.len(), 1);
        let payload = entries[0].payload.clone().unwrap();
        assert_eq!(payload["law_name"], "shutdown_watch");
        assert_eq!(payload["event_name"], "shutdown");
        assert_eq!(payload["payload"]["reason"], "drill");
    }

    #[derive(Debug)]
    struct BrokenTrail;

    impl AuditTrail for BrokenTrail {
        fn record(&mut self, _entry: &AuditEntry) -> Result<(), AuditError> {
            Err(AuditError::Io {
                source: std::io::Error::other("disk full"),
            })
        }
    }

    #[test]
    fn audit_failure_does_not_stop_enforcement() {
        let bus = Arc::new(EventBus::new());
        let (control, mut commands) = control_channel();
        let _subs = bus.attach(Arc::new(
            LawBook::new(&bus, control, Box::new(BrokenTrail))
                .enact(Law::on::<PauseEvent>("halt", LawAction::Pause)),
        ));

        let enforced = Arc::new(Mutex::new(0_u32));
        let sink = Arc::clone(&enforced);
        bus.subscribe::<LawEnforcedEvent, _>(Priority::Normal, move |_| {
            *sink.lock().unwrap() += 1;
            Ok(())
        });

        let report = bus.publish(PauseEvent::now());
        assert_eq!(report.failed, 0);
        assert_eq!(*enforced.lock().unwrap(), 1);
        assert_eq!(commands.try_next(), Pending::Command(GovernorCommand::Pause));
    }
}
