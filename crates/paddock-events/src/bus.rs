//! In-process publish/subscribe routing for race events.
//!
//! The [`EventBus`] decouples the race loop from whatever observes it (log
//! output, a dashboard, persistence). Handlers are asynchronous but are
//! always awaited one at a time, so every handler observes events in the
//! exact order they were published.
//!
//! # Dispatch order
//!
//! For each published event, handlers registered for that event's
//! [`EventType`] run first in registration order, followed by the
//! catch-all handlers registered with [`EventBus::subscribe_all`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use futures::FutureExt as _;
use futures::future::BoxFuture;
use tracing::trace;

use crate::event::{EventType, RaceEvent};

/// Something that reacts to published events.
pub trait EventHandler: Send + Sync {
    /// Handle one event. The bus awaits the returned future before
    /// dispatching to the next handler.
    fn handle<'a>(&'a self, event: &'a RaceEvent) -> BoxFuture<'a, ()>;
}

/// A reference-counted handler. Registration identity is the `Arc` pointer.
pub type SharedHandler = Arc<dyn EventHandler>;

/// Adapter that runs a synchronous closure as an [`EventHandler`].
pub struct FnHandler<F>(F);

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&RaceEvent) + Send + Sync,
{
    fn handle<'a>(&'a self, event: &'a RaceEvent) -> BoxFuture<'a, ()> {
        (self.0)(event);
        futures::future::ready(()).boxed()
    }
}

/// Wrap a synchronous closure as a [`SharedHandler`].
pub fn handler_fn<F>(f: F) -> SharedHandler
where
    F: Fn(&RaceEvent) + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Anything that can receive the core's event output.
///
/// The race-loop driver depends only on this trait, never on a concrete
/// bus.
pub trait EventSink: Send + Sync {
    /// Deliver one event, resolving once every receiver has handled it.
    fn publish<'a>(&'a self, event: &'a RaceEvent) -> BoxFuture<'a, ()>;

    /// Deliver events strictly in slice order, each one fully before the
    /// next.
    fn publish_all<'a>(&'a self, events: &'a [RaceEvent]) -> BoxFuture<'a, ()> {
        async move {
            for event in events {
                self.publish(event).await;
            }
        }
        .boxed()
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn publish<'a>(&'a self, event: &'a RaceEvent) -> BoxFuture<'a, ()> {
        (**self).publish(event)
    }

    fn publish_all<'a>(&'a self, events: &'a [RaceEvent]) -> BoxFuture<'a, ()> {
        (**self).publish_all(events)
    }
}

/// Which registry a [`Subscription`] belongs to.
#[derive(Debug, Clone, Copy)]
enum Target {
    Type(EventType),
    All,
}

#[derive(Default)]
struct Registry {
    typed: HashMap<EventType, Vec<SharedHandler>>,
    all: Vec<SharedHandler>,
}

/// Pointer identity of two handlers, ignoring vtables.
fn same_handler(a: &SharedHandler, b: &SharedHandler) -> bool {
    core::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

fn insert_unique(list: &mut Vec<SharedHandler>, handler: &SharedHandler) {
    if !list.iter().any(|h| same_handler(h, handler)) {
        list.push(Arc::clone(handler));
    }
}

/// Handle returned by [`EventBus::subscribe`] and
/// [`EventBus::subscribe_all`]. Dropping it keeps the subscription alive;
/// call [`Subscription::unsubscribe`] to remove the handler.
#[must_use = "dropping a Subscription does not unsubscribe; keep it to unsubscribe later"]
pub struct Subscription {
    registry: Weak<RwLock<Registry>>,
    target: Target,
    handler: SharedHandler,
}

impl Subscription {
    /// Remove the handler from the bus. A no-op if the bus was cleared or
    /// dropped in the meantime.
    pub fn unsubscribe(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut guard = registry.write().unwrap_or_else(PoisonError::into_inner);
        match self.target {
            Target::Type(event_type) => {
                if let Some(list) = guard.typed.get_mut(&event_type) {
                    list.retain(|h| !same_handler(h, &self.handler));
                    if list.is_empty() {
                        guard.typed.remove(&event_type);
                    }
                }
            }
            Target::All => guard.all.retain(|h| !same_handler(h, &self.handler)),
        }
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// In-process event router. Cloning shares the same subscriptions.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<RwLock<Registry>>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for one event type. Registering the same `Arc`
    /// twice is a no-op.
    pub fn subscribe(&self, event_type: EventType, handler: SharedHandler) -> Subscription {
        {
            let mut guard = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            insert_unique(guard.typed.entry(event_type).or_default(), &handler);
        }
        Subscription {
            registry: Arc::downgrade(&self.registry),
            target: Target::Type(event_type),
            handler,
        }
    }

    /// Register `handler` for every event regardless of type.
    pub fn subscribe_all(&self, handler: SharedHandler) -> Subscription {
        {
            let mut guard = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            insert_unique(&mut guard.all, &handler);
        }
        Subscription {
            registry: Arc::downgrade(&self.registry),
            target: Target::All,
            handler,
        }
    }

    /// Dispatch one event: typed handlers first, then catch-all handlers,
    /// each awaited before the next begins.
    pub async fn publish(&self, event: &RaceEvent) {
        let handlers = self.handlers_for(event.event_type());
        trace!(
            event_type = %event.event_type(),
            event_id = %event.id(),
            handlers = handlers.len(),
            "Publishing event"
        );
        for handler in &handlers {
            handler.handle(event).await;
        }
    }

    /// Publish each event in order, awaiting each fully before the next.
    pub async fn publish_all(&self, events: &[RaceEvent]) {
        for event in events {
            self.publish(event).await;
        }
    }

    /// Whether any typed or catch-all handler would receive `event_type`.
    pub fn has_subscribers(&self, event_type: EventType) -> bool {
        let guard = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        !guard.all.is_empty() || guard.typed.get(&event_type).is_some_and(|l| !l.is_empty())
    }

    /// Drop every subscription, typed and catch-all.
    pub fn clear(&self) {
        let mut guard = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        guard.typed.clear();
        guard.all.clear();
    }

    /// Snapshot the dispatch list so no lock is held across handler awaits.
    fn handlers_for(&self, event_type: EventType) -> Vec<SharedHandler> {
        let guard = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .typed
            .get(&event_type)
            .into_iter()
            .flatten()
            .chain(guard.all.iter())
            .cloned()
            .collect()
    }
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventSink for EventBus {
    fn publish<'a>(&'a self, event: &'a RaceEvent) -> BoxFuture<'a, ()> {
        Self::publish(self, event).boxed()
    }

    fn publish_all<'a>(&'a self, events: &'a [RaceEvent]) -> BoxFuture<'a, ()> {
        Self::publish_all(self, events).boxed()
    }
}
