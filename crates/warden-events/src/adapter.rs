//! Bridge from the bus into a bounded queue.
//!
//! Transports that deliver events outside the process (sockets, legacy
//! consumers) do not subscribe to the bus directly. They read
//! [`EventEnvelope`]s from the receiver returned by
//! [`TransportBridge::new`]. The bridge listens at
//! [`Priority::Monitor`] on every catalog event type and uses `try_send`,
//! so a full queue drops the envelope and counts it instead of blocking
//! the publisher.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use warden_types::EventId;

use crate::bus::{EventBus, Priority};
use crate::catalog::{
    CheckpointSavedEvent, CheckpointScheduledEvent, ContinuityBreachEvent, Event,
    LawEnforcedEvent, PauseEvent, PolicyViolationEvent, ResumeEvent, RollbackEvent,
    ShutdownEvent,
};
use crate::error::HandlerResult;
use crate::subscriber::{Subscriber, Subscriptions};

/// Transport-facing projection of a catalog event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Envelope identifier.
    pub id: EventId,
    /// [`Event::NAME`] of the wrapped event.
    pub name: String,
    /// Capture time of the wrapped event.
    pub occurred_at: DateTime<Utc>,
    /// [`Event::payload`] of the wrapped event.
    pub payload: Value,
}

impl EventEnvelope {
    /// Wrap `event`.
    pub fn from_event<E: Event>(event: &E) -> Self {
        Self {
            id: EventId::new(),
            name: E::NAME.to_owned(),
            occurred_at: event.occurred_at(),
            payload: event.payload(),
        }
    }
}

/// Forwards every catalog event into a bounded queue.
#[derive(Debug)]
pub struct TransportBridge {
    tx: mpsc::Sender<EventEnvelope>,
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

impl TransportBridge {
    /// Create a bridge with a queue of `capacity` envelopes (at least one).
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<EventEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let bridge = Arc::new(Self {
            tx,
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        (bridge, rx)
    }

    /// Envelopes accepted by the queue.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Envelopes discarded because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward<E: Event>(&self, event: &E) -> HandlerResult {
        match self.tx.try_send(EventEnvelope::from_event(event)) {
            Ok(()) => {
                self.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(envelope)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                debug!(event = %envelope.name, dropped, "Transport queue full, envelope dropped");
            }
            Err(TrySendError::Closed(envelope)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(event = %envelope.name, "Transport queue closed, envelope dropped");
            }
        }
        Ok(())
    }

    fn bridge<E: Event>(self: &Arc<Self>, bus: &EventBus, subs: &mut Subscriptions) {
        let this = Arc::clone(self);
        let id = bus.subscribe::<E, _>(Priority::Monitor, move |event| this.forward(event));
        subs.push::<E>(id);
    }
}

impl Subscriber for TransportBridge {
    fn attach(self: Arc<Self>, bus: &EventBus) -> Subscriptions {
        let mut subs = Subscriptions::new();
        self.bridge::<PauseEvent>(bus, &mut subs);
        self.bridge::<ResumeEvent>(bus, &mut subs);
        self.bridge::<ShutdownEvent>(bus, &mut subs);
        self.bridge::<RollbackEvent>(bus, &mut subs);
        self.bridge::<ContinuityBreachEvent>(bus, &mut subs);
        self.bridge::<CheckpointScheduledEvent>(bus, &mut subs);
        self.bridge::<CheckpointSavedEvent>(bus, &mut subs);
        self.bridge::<PolicyViolationEvent>(bus, &mut subs);
        self.bridge::<LawEnforcedEvent>(bus, &mut subs);
        subs
    }
}
