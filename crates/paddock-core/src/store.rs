//! Program state seen by the race-loop driver.
//!
//! The driver reads and writes the race list, the current race index, the
//! running flag, and a tick counter through [`RaceStore`]. Presentation
//! layers can back it with whatever they like; [`ProgramState`] keeps it
//! all in memory.

use crate::race::Race;

/// State accessors the driver depends on.
pub trait RaceStore: Send {
    /// All races on the card, in running order.
    fn races(&self) -> &[Race];

    /// Replace the card. Does not touch the index or tick counter.
    fn set_races(&mut self, races: Vec<Race>);

    /// Index of the race being run.
    fn current_index(&self) -> usize;

    /// Point at another race. Out-of-range indices are allowed and simply
    /// have no current race.
    fn set_current_index(&mut self, index: usize);

    /// The race at the current index, if any.
    fn current_race(&self) -> Option<&Race> {
        self.races().get(self.current_index())
    }

    /// Mutable access to the race at the current index, if any.
    fn current_race_mut(&mut self) -> Option<&mut Race>;

    /// Whether a race is being run.
    fn is_running(&self) -> bool;

    /// Set the running flag.
    fn set_running(&mut self, running: bool);

    /// Turns completed in the current race.
    fn tick(&self) -> u64;

    /// Overwrite the tick counter.
    fn set_tick(&mut self, tick: u64);

    /// Add one to the tick counter.
    fn increment_tick(&mut self) {
        let next = self.tick().saturating_add(1);
        self.set_tick(next);
    }

    /// Zero the tick counter.
    fn reset_tick(&mut self) {
        self.set_tick(0);
    }

    /// Move to the next race. Returns `false` and leaves the index alone
    /// when the current race is the last one.
    fn advance_to_next_race(&mut self) -> bool {
        let next = self.current_index().saturating_add(1);
        if next < self.races().len() {
            self.set_current_index(next);
            true
        } else {
            false
        }
    }
}

/// In-memory [`RaceStore`].
#[derive(Debug, Clone, Default)]
pub struct ProgramState {
    races: Vec<Race>,
    current_index: usize,
    is_running: bool,
    tick: u64,
}

impl ProgramState {
    /// A store holding `races`, pointed at the first one.
    pub const fn new(races: Vec<Race>) -> Self {
        Self {
            races,
            current_index: 0,
            is_running: false,
            tick: 0,
        }
    }
}

impl RaceStore for ProgramState {
    fn races(&self) -> &[Race] {
        &self.races
    }

    fn set_races(&mut self, races: Vec<Race>) {
        self.races = races;
    }

    fn current_index(&self) -> usize {
        self.current_index
    }

    fn set_current_index(&mut self, index: usize) {
        self.current_index = index;
    }

    fn current_race_mut(&mut self) -> Option<&mut Race> {
        self.races.get_mut(self.current_index)
    }

    fn is_running(&self) -> bool {
        self.is_running
    }

    fn set_running(&mut self, running: bool) {
        self.is_running = running;
    }

    fn tick(&self) -> u64 {
        self.tick
    }

    fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }
}
