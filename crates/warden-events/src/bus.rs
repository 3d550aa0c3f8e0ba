//! Typed, priority-ordered publish/subscribe bus.
//!
//! Handlers are registered per event type and kept sorted by
//! [`Priority`] (`High`, `Normal`, `Low`, then `Monitor`), preserving
//! registration order within a priority.
//!
//! # Dispatch model
//!
//! - Synchronous handlers run inline on the publisher's thread, in
//!   priority order.
//! - Asynchronous handlers are spawned onto the ambient Tokio runtime.
//!   [`EventBus::publish`] returns as soon as they are scheduled;
//!   [`EventBus::publish_async`] additionally awaits every task it spawned.
//!
//! # Isolation
//!
//! A handler that returns an error or panics is logged and skipped; the
//! remaining handlers still receive the event and the publisher never sees
//! the failure. Async panics are caught at the task boundary.
//!
//! # Concurrency
//!
//! The registration table sits behind a [`RwLock`]. Publishing clones a
//! snapshot of the handler list and releases the lock before invoking
//! anything, so a handler may subscribe, unsubscribe (itself included), or
//! publish re-entrantly without deadlocking or disturbing the in-flight
//! delivery.
//!
//! There is no per-handler timeout: a synchronous handler that hangs stalls
//! its publisher for as long as it runs.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::{BoxFuture, join_all};
use futures::FutureExt as _;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::catalog::Event;
use crate::error::{HandlerError, HandlerResult};

/// Delivery class controlling the order in which handlers see an event.
///
/// Delivery order is `High`, `Normal`, `Low`, `Monitor`. `Monitor`
/// handlers always run last and must not mutate the state the event
/// describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Delivered after `Normal`.
    Low,
    /// Default class.
    #[default]
    Normal,
    /// Delivered first.
    High,
    /// Observers that must not influence outcomes; delivered last.
    Monitor,
}

impl Priority {
    /// Higher rank is delivered earlier.
    const fn rank(self) -> u8 {
        match self {
            Self::High => 3,
            Self::Normal => 2,
            Self::Low => 1,
            Self::Monitor => 0,
        }
    }
}

/// Token identifying one registration, used to unsubscribe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl core::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What happened to one published event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Synchronous handlers that completed without error.
    pub delivered: usize,
    /// Asynchronous handlers handed to the runtime.
    pub scheduled: usize,
    /// Handlers that errored, panicked, or could not be scheduled.
    ///
    /// For [`EventBus::publish`] this only counts synchronous failures;
    /// [`EventBus::publish_async`] also counts failed async tasks.
    pub failed: usize,
}

type SyncHandler = dyn Fn(&(dyn Any + Send + Sync)) -> HandlerResult + Send + Sync;
type AsyncHandler =
    dyn Fn(Arc<dyn Any + Send + Sync>) -> BoxFuture<'static, HandlerResult> + Send + Sync;

#[derive(Clone)]
enum Dispatch {
    Sync(Arc<SyncHandler>),
    Async(Arc<AsyncHandler>),
}

#[derive(Clone)]
struct Registration {
    id: SubscriptionId,
    priority: Priority,
    dispatch: Dispatch,
}

/// Process-wide event router.
///
/// Construct one at startup and share it by `Arc` with the governor and
/// every subscriber.
pub struct EventBus {
    handlers: RwLock<HashMap<TypeId, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a bus with no registrations.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a synchronous handler for events of type `E`.
    ///
    /// Registering the same closure twice creates two registrations.
    pub fn subscribe<E, F>(&self, priority: Priority, handler: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) -> HandlerResult + Send + Sync + 'static,
    {
        let erased: Arc<SyncHandler> = Arc::new(move |any: &(dyn Any + Send + Sync)| {
            any.downcast_ref::<E>().map_or(
                Err(HandlerError::TypeMismatch { expected: E::NAME }),
                &handler,
            )
        });
        self.register(TypeId::of::<E>(), E::NAME, priority, Dispatch::Sync(erased))
    }

    /// Register an asynchronous handler for events of type `E`.
    ///
    /// The handler receives a shared reference to the event and its future
    /// is spawned on the ambient Tokio runtime at publish time.
    pub fn subscribe_async<E, F, Fut>(&self, priority: Priority, handler: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let erased: Arc<AsyncHandler> =
            Arc::new(move |any: Arc<dyn Any + Send + Sync>| match any.downcast::<E>() {
                Ok(event) => handler(event).boxed(),
                Err(_) => {
                    futures::future::ready(Err(HandlerError::TypeMismatch { expected: E::NAME }))
                        .boxed()
                }
            });
        self.register(TypeId::of::<E>(), E::NAME, priority, Dispatch::Async(erased))
    }

    /// Remove the registration `id` for events of type `E`.
    ///
    /// Returns `true` if a registration was removed.
    pub fn unsubscribe<E: Event>(&self, id: SubscriptionId) -> bool {
        self.unsubscribe_type(TypeId::of::<E>(), id)
    }

    /// Number of handlers currently registered for `E`.
    pub fn handler_count<E: Event>(&self) -> usize {
        self.read_table()
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    pub(crate) fn unsubscribe_type(&self, type_id: TypeId, id: SubscriptionId) -> bool {
        let mut table = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(list) = table.get_mut(&type_id) else {
            return false;
        };
        let Some(pos) = list.iter().position(|r| r.id == id) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            table.remove(&type_id);
        }
        true
    }

    fn register(
        &self,
        type_id: TypeId,
        name: &'static str,
        priority: Priority,
        dispatch: Dispatch,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Registration {
            id,
            priority,
            dispatch,
        };

        let mut table = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let list = table.entry(type_id).or_default();
        // Insert after every registration of equal or higher rank.
        let rank = priority.rank();
        let pos = list
            .iter()
            .position(|r| r.priority.rank() < rank)
            .unwrap_or(list.len());
        list.insert(pos, registration);

        debug!(event = name, subscription = %id, ?priority, "Handler subscribed");
        id
    }

    fn read_table(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<TypeId, Vec<Registration>>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self, type_id: TypeId) -> Vec<Registration> {
        self.read_table().get(&type_id).cloned().unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Publication
    // -----------------------------------------------------------------------

    /// Deliver `event` to every handler registered for its type.
    ///
    /// Sync handlers run inline; async handlers are spawned and not awaited.
    /// Publishing a type nobody subscribed to is a no-op.
    pub fn publish<E: Event>(&self, event: E) -> DeliveryReport {
        let (report, _detached) = self.dispatch(event);
        report
    }

    /// Like [`publish`](Self::publish), but waits for every async handler
    /// spawned for this event before returning.
    pub async fn publish_async<E: Event>(&self, event: E) -> DeliveryReport {
        let (mut report, tasks) = self.dispatch(event);
        for outcome in join_all(tasks).await {
            if !matches!(outcome, Ok(true)) {
                report.failed = report.failed.saturating_add(1);
            }
        }
        report
    }

    fn dispatch<E: Event>(&self, event: E) -> (DeliveryReport, Vec<JoinHandle<bool>>) {
        let registrations = self.snapshot(TypeId::of::<E>());
        let mut report = DeliveryReport::default();
        let mut tasks = Vec::new();
        if registrations.is_empty() {
            return (report, tasks);
        }

        let shared: Arc<dyn Any + Send + Sync> = Arc::new(event);
        for registration in registrations {
            match registration.dispatch {
                Dispatch::Sync(handler) => {
                    if run_sync(&handler, shared.as_ref(), E::NAME, registration.id) {
                        report.delivered = report.delivered.saturating_add(1);
                    } else {
                        report.failed = report.failed.saturating_add(1);
                    }
                }
                Dispatch::Async(handler) => {
                    match spawn_async(&handler, Arc::clone(&shared), E::NAME, registration.id) {
                        Some(task) => {
                            tasks.push(task);
                            report.scheduled = report.scheduled.saturating_add(1);
                        }
                        None => report.failed = report.failed.saturating_add(1),
                    }
                }
            }
        }
        (report, tasks)
    }
}

/// Run one sync handler, returning whether it succeeded.
fn run_sync(
    handler: &Arc<SyncHandler>,
    event: &(dyn Any + Send + Sync),
    name: &'static str,
    id: SubscriptionId,
) -> bool {
    match catch_unwind(AssertUnwindSafe(|| handler(event))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(event = name, subscription = %id, error = %e, "Event handler failed");
            false
        }
        Err(_) => {
            error!(event = name, subscription = %id, "Event handler panicked");
            false
        }
    }
}

/// Spawn one async handler onto the ambient runtime.
///
/// Returns `None` when there is no runtime or building the future panicked.
fn spawn_async(
    handler: &Arc<AsyncHandler>,
    event: Arc<dyn Any + Send + Sync>,
    name: &'static str,
    id: SubscriptionId,
) -> Option<JoinHandle<bool>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!(event = name, subscription = %id, "No async runtime, handler skipped");
        return None;
    };
    let Ok(future) = catch_unwind(AssertUnwindSafe(|| handler(event))) else {
        error!(event = name, subscription = %id, "Async event handler panicked");
        return None;
    };
    Some(runtime.spawn(async move {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(event = name, subscription = %id, error = %e, "Async event handler failed");
                false
            }
            Err(_) => {
                error!(event = name, subscription = %id, "Async event handler panicked");
                false
            }
        }
    }))
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let table = self.read_table();
        let registrations: usize = table.values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("event_types", &table.len())
            .field("registrations", &registrations)
            .finish()
    }
}
