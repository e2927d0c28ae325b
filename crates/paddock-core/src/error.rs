//! Error types for race operations.
//!
//! All of these are expected, operational outcomes. The race-loop driver
//! treats most of them as signals to move the program forward rather than
//! as failures.

use paddock_types::{HorseId, RaceId, RunningHorseId, ValidationError};

/// Errors raised by the race aggregate and its running horses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RaceError {
    /// A race cannot be created with an empty lineup.
    #[error("a race needs at least one horse")]
    NoHorses,

    /// The same horse was entered twice in one lineup.
    #[error("horse {horse_id} is entered more than once")]
    DuplicateHorse {
        /// The repeated horse.
        horse_id: HorseId,
    },

    /// `turn()` was called before `start()`.
    #[error("race {race_id} has not started")]
    NotStarted {
        /// The race.
        race_id: RaceId,
    },

    /// The race has already finished.
    #[error("race {race_id} has already finished")]
    AlreadyFinished {
        /// The race.
        race_id: RaceId,
    },

    /// A finished horse was asked to run again.
    #[error("horse entry {running_id} has already finished")]
    HorseAlreadyFinished {
        /// The race entry.
        running_id: RunningHorseId,
    },

    /// A configured horse or distance failed validation.
    #[error("invalid race entry: {source}")]
    InvalidHorse {
        /// The rejected value.
        #[from]
        source: ValidationError,
    },
}
