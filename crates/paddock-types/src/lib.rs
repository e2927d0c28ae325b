//! Shared type definitions for the Paddock race simulation.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for horses, race entries, races and
//!   events
//! - [`values`] -- Validated value objects (condition, distance, name, color)
//! - [`horse`] -- The immutable [`Horse`] participant
//! - [`error`] -- [`ValidationError`] for rejected construction input

pub mod error;
pub mod horse;
pub mod ids;
pub mod values;

pub use error::ValidationError;
pub use horse::Horse;
pub use ids::{EventId, HorseId, RaceId, RunningHorseId};
pub use values::{Condition, Distance, HorseColor, HorseName, MAX_CONDITION, MIN_CONDITION};
