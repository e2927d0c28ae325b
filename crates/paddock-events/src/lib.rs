//! Domain events and event routing for the Paddock race simulation.
//!
//! The race aggregate buffers [`RaceEvent`]s while it mutates; the race-loop
//! driver drains them after every call and forwards them to an
//! [`EventSink`], normally the [`EventBus`], which fans them out to
//! subscribers.
//!
//! # Modules
//!
//! - [`event`] -- Event envelope, type discriminator, and payloads
//! - [`bus`] -- Publish/subscribe router and the [`EventSink`] seam

pub mod bus;
pub mod event;

pub use bus::{EventBus, EventHandler, EventSink, FnHandler, SharedHandler, Subscription, handler_fn};
pub use event::{
    AGGREGATE_TYPE, EventType, HorseFinished, HorsePosition, Placing, RaceEvent, RaceEventKind,
    RaceFinished, RaceStarted, TurnCompleted,
};
