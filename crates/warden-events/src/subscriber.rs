//! Explicit registration lists.
//!
//! Components that listen on the bus implement [`Subscriber`]: they
//! register their handlers in [`Subscriber::attach`] and return the
//! resulting [`Subscriptions`], which the wiring code keeps so it can
//! [`detach`](Subscriptions::detach) them later. All wiring is composed at
//! startup; nothing is discovered at runtime.

use std::any::TypeId;
use std::sync::Arc;

use crate::bus::{EventBus, SubscriptionId};
use crate::catalog::Event;

/// A component that exposes handlers for one or more event types.
pub trait Subscriber: Send + Sync + 'static {
    /// Register this component's handlers on `bus`.
    fn attach(self: Arc<Self>, bus: &EventBus) -> Subscriptions;
}

/// The registrations created by one [`Subscriber`].
#[derive(Debug, Default)]
pub struct Subscriptions {
    entries: Vec<(TypeId, &'static str, SubscriptionId)>,
}

impl Subscriptions {
    /// An empty list.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record a registration for events of type `E`.
    pub fn push<E: Event>(&mut self, id: SubscriptionId) {
        self.entries.push((TypeId::of::<E>(), E::NAME, id));
    }

    /// Number of registrations held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no registrations are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Event names this list is registered for, in registration order.
    pub fn event_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(_, name, _)| *name)
    }

    /// Remove every registration from `bus`.
    ///
    /// Returns how many were still present.
    pub fn detach(self, bus: &EventBus) -> usize {
        self.entries
            .into_iter()
            .filter(|(type_id, _, id)| bus.unsubscribe_type(*type_id, *id))
            .count()
    }
}

impl EventBus {
    /// Attach `subscriber` and return its registrations.
    pub fn attach<S: Subscriber>(&self, subscriber: Arc<S>) -> Subscriptions {
        subscriber.attach(self)
    }
}
