//! Event catalog, typed publish/subscribe bus, and transport bridge.
//!
//! Every governor transition is described by an immutable value in
//! [`catalog`] and delivered through an [`EventBus`] that routes by event
//! type. Subscribers are wired explicitly at startup: components implement
//! [`Subscriber`] and hand back the [`Subscriptions`] they created, so there
//! is exactly one bus per process and no hidden global registry.
//!
//! # Modules
//!
//! - [`catalog`] -- The [`Event`] trait and every concrete governor event.
//! - [`bus`] -- Priority-ordered, panic-isolated dispatch to sync and async
//!   handlers.
//! - [`subscriber`] -- Explicit registration lists.
//! - [`adapter`] -- Bridge from the bus into a bounded queue for
//!   transports that do their own delivery.
//! - [`error`] -- Handler error type.

pub mod adapter;
pub mod bus;
pub mod catalog;
pub mod error;
pub mod subscriber;

// Re-export primary types for convenience.
pub use adapter::{EventEnvelope, TransportBridge};
pub use bus::{DeliveryReport, EventBus, Priority, SubscriptionId};
pub use catalog::{
    CheckpointSavedEvent, CheckpointScheduledEvent, ContinuityBreachEvent, Event,
    LawEnforcedEvent, PauseEvent, PolicyViolationEvent, ResumeEvent, RollbackEvent,
    ShutdownEvent,
};
pub use error::{HandlerError, HandlerResult};
pub use subscriber::{Subscriber, Subscriptions};
