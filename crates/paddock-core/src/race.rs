//! The race aggregate and its turn algorithm.
//!
//! A [`Race`] owns a fixed lineup of [`RunningHorse`] entries (an arena
//! indexed by lineup position), the finish order, and a buffer of domain
//! events raised while it mutates. The driver drains that buffer with
//! [`Race::clear_domain_events`] after every call.
//!
//! # State machine
//!
//! `not started` -> `started` -> `finished`. There is no way back.
//!
//! # Turn event order
//!
//! Each successful [`Race::turn`] buffers zero or more `HorseFinished`,
//! then exactly one `TurnCompleted`, then at most one `RaceFinished`.
//! Horses that finish on the same turn are placed in lineup order.

use std::collections::HashSet;

use paddock_events::{
    HorseFinished, HorsePosition, Placing, RaceEvent, RaceEventKind, RaceFinished, RaceStarted,
    TurnCompleted,
};
use paddock_types::{Distance, Horse, HorseId, RaceId, RunningHorseId};
use serde::{Deserialize, Serialize};

use crate::error::RaceError;
use crate::random::RandomSource;
use crate::running::RunningHorse;

/// Serializable form of a [`Race`], used to save and restore it.
///
/// Pending events are deliberately absent: they belong to the in-flight
/// mutation, not to the race's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceRecord {
    /// Race identity.
    pub id: RaceId,
    /// Course length.
    pub distance: Distance,
    /// Lineup in gate order.
    pub horses: Vec<RunningHorse>,
    /// Entry ids in finish order.
    pub results: Vec<RunningHorseId>,
    /// Whether the race has started.
    pub is_started: bool,
    /// Completed turns.
    pub turn_count: u32,
}

/// One row of [`Race::leaderboard`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based rank by current position.
    pub rank: u32,
    /// Race entry id.
    pub running_id: RunningHorseId,
    /// Horse identity.
    pub horse_id: HorseId,
    /// Display name.
    pub name: String,
    /// Metres from the start.
    pub position: u32,
    /// Percentage of the course covered.
    pub progress: f64,
    /// Whether the horse has crossed the line.
    pub is_finished: bool,
}

/// The race aggregate root.
#[derive(Debug, Clone)]
pub struct Race {
    id: RaceId,
    distance: Distance,
    horses: Vec<RunningHorse>,
    /// Lineup indices in finish order.
    results: Vec<usize>,
    is_started: bool,
    turn_count: u32,
    pending_events: Vec<RaceEvent>,
}

impl Race {
    /// Enter `horses` (in gate order) for a race over `distance`.
    ///
    /// # Errors
    ///
    /// Returns [`RaceError::NoHorses`] for an empty lineup and
    /// [`RaceError::DuplicateHorse`] if a horse is entered twice.
    pub fn create(horses: Vec<Horse>, distance: Distance) -> Result<Self, RaceError> {
        if horses.is_empty() {
            return Err(RaceError::NoHorses);
        }
        let mut seen = HashSet::with_capacity(horses.len());
        for horse in &horses {
            if !seen.insert(horse.id()) {
                return Err(RaceError::DuplicateHorse {
                    horse_id: horse.id(),
                });
            }
        }

        Ok(Self {
            id: RaceId::new(),
            distance,
            horses: horses
                .into_iter()
                .map(|horse| RunningHorse::create(horse, None))
                .collect(),
            results: Vec::new(),
            is_started: false,
            turn_count: 0,
            pending_events: Vec::new(),
        })
    }

    /// Restore a race from a saved record without validation. Result ids
    /// that do not match a lineup entry are dropped.
    pub fn reconstitute(record: RaceRecord) -> Self {
        let results = record
            .results
            .iter()
            .filter_map(|id| record.horses.iter().position(|h| h.id() == *id))
            .collect();
        Self {
            id: record.id,
            distance: record.distance,
            horses: record.horses,
            results,
            is_started: record.is_started,
            turn_count: record.turn_count,
            pending_events: Vec::new(),
        }
    }

    /// Capture the race's state for persistence.
    pub fn to_record(&self) -> RaceRecord {
        RaceRecord {
            id: self.id,
            distance: self.distance,
            horses: self.horses.clone(),
            results: self.results().map(RunningHorse::id).collect(),
            is_started: self.is_started,
            turn_count: self.turn_count,
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Open the gates. Calling this again while the race is running is a
    /// successful no-op and raises no further event.
    ///
    /// # Errors
    ///
    /// Returns [`RaceError::AlreadyFinished`] once every horse has finished.
    pub fn start(&mut self) -> Result<(), RaceError> {
        if self.is_finished() {
            return Err(RaceError::AlreadyFinished { race_id: self.id });
        }
        if !self.is_started {
            self.is_started = true;
            self.raise(RaceEventKind::RaceStarted(RaceStarted {
                horse_count: self.horse_count(),
                distance_meters: self.distance.meters(),
            }));
        }
        Ok(())
    }

    /// Advance every unfinished horse by one draw from `random`.
    ///
    /// # Errors
    ///
    /// Returns [`RaceError::NotStarted`] before [`Race::start`], otherwise
    /// [`RaceError::AlreadyFinished`] once the race is over. Neither
    /// changes any state.
    pub fn turn(&mut self, random: &mut dyn RandomSource) -> Result<(), RaceError> {
        if !self.is_started {
            return Err(RaceError::NotStarted { race_id: self.id });
        }
        if self.is_finished() {
            return Err(RaceError::AlreadyFinished { race_id: self.id });
        }

        self.turn_count = self.turn_count.saturating_add(1);
        let race_length = self.distance.meters();

        // Iterating in gate order makes lineup order the tiebreak.
        let mut finished_now = Vec::new();
        for (index, horse) in self.horses.iter_mut().enumerate() {
            if horse.is_finished() {
                continue;
            }
            if horse.run(race_length, random).is_ok() && horse.is_finished() {
                finished_now.push(index);
            }
        }

        for index in finished_now {
            self.results.push(index);
            let place = u32::try_from(self.results.len()).unwrap_or(u32::MAX);
            if let Some(horse) = self.horses.get(index) {
                let kind = RaceEventKind::HorseFinished(HorseFinished {
                    running_id: horse.id(),
                    horse_id: horse.horse().id(),
                    name: horse.horse().name().to_string(),
                    finish_position: horse.position(),
                    place,
                });
                self.raise(kind);
            }
        }

        self.raise(RaceEventKind::TurnCompleted(TurnCompleted {
            turn: self.turn_count,
            positions: self.position_snapshot(),
        }));

        if self.is_finished() {
            self.raise(RaceEventKind::RaceFinished(RaceFinished {
                results: self.placings(),
            }));
        }
        Ok(())
    }

    /// Drain and return every buffered event, oldest first.
    pub fn clear_domain_events(&mut self) -> Vec<RaceEvent> {
        std::mem::take(&mut self.pending_events)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Horses ordered by position, leader first. Ties keep gate order.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let race_length = self.distance.meters();
        let mut order: Vec<&RunningHorse> = self.horses.iter().collect();
        order.sort_by(|a, b| b.position().cmp(&a.position()));
        order
            .into_iter()
            .zip(1_u32..)
            .map(|(horse, rank)| LeaderboardEntry {
                rank,
                running_id: horse.id(),
                horse_id: horse.horse().id(),
                name: horse.horse().name().to_string(),
                position: horse.position(),
                progress: horse.progress(race_length),
                is_finished: horse.is_finished(),
            })
            .collect()
    }

    /// Race identity.
    pub const fn id(&self) -> RaceId {
        self.id
    }

    /// Course length.
    pub const fn distance(&self) -> Distance {
        self.distance
    }

    /// Lineup in gate order.
    pub fn horses(&self) -> &[RunningHorse] {
        &self.horses
    }

    /// Size of the lineup.
    pub fn horse_count(&self) -> u32 {
        u32::try_from(self.horses.len()).unwrap_or(u32::MAX)
    }

    /// Finished horses, winner first.
    pub fn results(&self) -> impl Iterator<Item = &RunningHorse> {
        self.results.iter().filter_map(|&index| self.horses.get(index))
    }

    /// Events raised since the last drain.
    pub fn pending_events(&self) -> &[RaceEvent] {
        &self.pending_events
    }

    /// Whether [`Race::start`] has succeeded.
    pub const fn is_started(&self) -> bool {
        self.is_started
    }

    /// Whether every horse has finished.
    pub fn is_finished(&self) -> bool {
        self.results.len() == self.horses.len()
    }

    /// Completed turns.
    pub const fn turn_count(&self) -> u32 {
        self.turn_count
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn raise(&mut self, kind: RaceEventKind) {
        self.pending_events.push(RaceEvent::new(self.id, kind));
    }

    fn position_snapshot(&self) -> Vec<HorsePosition> {
        self.horses
            .iter()
            .map(|horse| HorsePosition {
                running_id: horse.id(),
                horse_id: horse.horse().id(),
                name: horse.horse().name().to_string(),
                position: horse.position(),
                is_finished: horse.is_finished(),
            })
            .collect()
    }

    fn placings(&self) -> Vec<Placing> {
        self.results()
            .zip(1_u32..)
            .map(|(horse, place)| Placing {
                place,
                running_id: horse.id(),
                horse_id: horse.horse().id(),
                name: horse.horse().name().to_string(),
                finish_position: horse.position(),
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use paddock_events::EventType;

    use super::*;
    use crate::random::{FixedRandom, ScriptedRandom, SeededRandom};

    fn horse(name: &str, condition: u32) -> Horse {
        Horse::create(name, "#336699", condition).unwrap()
    }

    fn d(meters: u32) -> Distance {
        Distance::new(meters).unwrap()
    }

    fn types(events: &[RaceEvent]) -> Vec<EventType> {
        events.iter().map(RaceEvent::event_type).collect()
    }

    #[test]
    fn empty_lineup_is_rejected() {
        assert_eq!(Race::create(Vec::new(), d(1200)).unwrap_err(), RaceError::NoHorses);
    }

    #[test]
    fn duplicate_entry_is_rejected() {
        let h = horse("Twice", 50);
        let err = Race::create(vec![h.clone(), h.clone()], d(1200)).unwrap_err();
        assert_eq!(err, RaceError::DuplicateHorse { horse_id: h.id() });
    }

    #[test]
    fn start_is_idempotent() {
        let mut race = Race::create(vec![horse("A", 50)], d(1400)).unwrap();
        for _ in 0..5 {
            race.start().unwrap();
        }
        let events = race.clear_domain_events();
        assert_eq!(types(&events), [EventType::RaceStarted]);
        let RaceEventKind::RaceStarted(payload) = events[0].kind() else {
            panic!("expected RaceStarted");
        };
        assert_eq!(payload.horse_count, 1);
        assert_eq!(payload.distance_meters, 1400);
        assert!(race.clear_domain_events().is_empty());
    }

    #[test]
    fn turn_before_start_is_rejected() {
        let mut race = Race::create(vec![horse("A", 50)], d(1200)).unwrap();
        let err = race.turn(&mut FixedRandom::new(0.5)).unwrap_err();
        assert_eq!(err, RaceError::NotStarted { race_id: race.id() });
        assert_eq!(race.turn_count(), 0);
        assert!(race.pending_events().is_empty());
    }

    #[test]
    fn single_horse_finishes_in_twelve_turns() {
        let mut race = Race::create(vec![horse("Solo", 100)], d(1200)).unwrap();
        race.start().unwrap();
        race.clear_domain_events();
        let mut random = FixedRandom::new(0.99);

        for turn in 1..=11 {
            race.turn(&mut random).unwrap();
            assert_eq!(race.turn_count(), turn);
            assert!(!race.is_finished());
        }
        race.clear_domain_events();

        race.turn(&mut random).unwrap();
        assert_eq!(race.turn_count(), 12);
        assert!(race.is_finished());
        assert_eq!(race.results().count(), 1);

        let events = race.clear_domain_events();
        assert_eq!(
            types(&events),
            [
                EventType::HorseFinished,
                EventType::TurnCompleted,
                EventType::RaceFinished
            ]
        );
        let RaceEventKind::RaceFinished(finished) = events[2].kind() else {
            panic!("expected RaceFinished");
        };
        assert_eq!(finished.results.len(), 1);
        assert_eq!(finished.results[0].place, 1);
        assert_eq!(finished.results[0].finish_position, 1200);

        let err = race.turn(&mut random).unwrap_err();
        assert_eq!(err, RaceError::AlreadyFinished { race_id: race.id() });
        assert_eq!(race.turn_count(), 12);
        assert_eq!(race.start().unwrap_err(), RaceError::AlreadyFinished { race_id: race.id() });
    }

    #[test]
    fn two_horses_half_draw_snapshot() {
        let mut race = Race::create(vec![horse("A", 50), horse("B", 50)], d(1200)).unwrap();
        race.start().unwrap();
        race.clear_domain_events();

        race.turn(&mut FixedRandom::new(0.5)).unwrap();

        let events = race.clear_domain_events();
        assert_eq!(types(&events), [EventType::TurnCompleted]);
        let RaceEventKind::TurnCompleted(payload) = events[0].kind() else {
            panic!("expected TurnCompleted");
        };
        assert_eq!(payload.turn, 1);
        assert_eq!(payload.positions.len(), 2);
        for entry in &payload.positions {
            assert_eq!(entry.position, 26);
            assert!(!entry.is_finished);
        }
    }

    #[test]
    fn simultaneous_finishers_keep_gate_order() {
        let lineup = vec![horse("Gate1", 100), horse("Gate2", 100), horse("Gate3", 10)];
        let ids: Vec<HorseId> = lineup.iter().map(Horse::id).collect();
        let mut race = Race::create(lineup, d(1200)).unwrap();
        race.start().unwrap();
        race.clear_domain_events();

        let mut random = FixedRandom::new(0.99);
        for _ in 0..12 {
            race.turn(&mut random).unwrap();
        }

        let events = race.clear_domain_events();
        let finishers: Vec<(HorseId, u32)> = events
            .iter()
            .filter_map(|e| match e.kind() {
                RaceEventKind::HorseFinished(f) => Some((f.horse_id, f.place)),
                _ => None,
            })
            .collect();
        assert_eq!(finishers, [(ids[0], 1), (ids[1], 2)]);
        assert!(!race.is_finished());
    }

    #[test]
    fn event_order_within_a_turn() {
        let mut race = Race::create(vec![horse("Fast", 100), horse("Slow", 1)], d(1200)).unwrap();
        race.start().unwrap();
        race.clear_domain_events();
        let mut random = FixedRandom::new(0.99);

        for _ in 0..12 {
            race.turn(&mut random).unwrap();
        }
        let events = race.clear_domain_events();
        let tail = &events[events.len() - 2..];
        assert_eq!(types(tail), [EventType::HorseFinished, EventType::TurnCompleted]);

        while !race.is_finished() {
            race.turn(&mut random).unwrap();
            let events = race.clear_domain_events();
            let turn_at = events
                .iter()
                .position(|e| e.event_type() == EventType::TurnCompleted)
                .unwrap();
            assert!(events[..turn_at]
                .iter()
                .all(|e| e.event_type() == EventType::HorseFinished));
            assert!(events[turn_at + 1..]
                .iter()
                .all(|e| e.event_type() == EventType::RaceFinished));
        }
    }

    #[test]
    fn results_invariants_hold_through_a_random_race() {
        let lineup: Vec<Horse> = (1..=6).map(|i| horse(&format!("H{i}"), i * 15)).collect();
        let mut race = Race::create(lineup, d(2200)).unwrap();
        race.start().unwrap();
        let mut random = SeededRandom::from_seed(2024);

        let mut last_turn = 0;
        while !race.is_finished() {
            race.turn(&mut random).unwrap();
            assert_eq!(race.turn_count(), last_turn + 1);
            last_turn = race.turn_count();

            assert!(race.results().count() <= race.horses().len());
            for entry in race.horses() {
                assert!(entry.position() <= 2200);
            }
            let finished = race.horses().iter().filter(|h| h.is_finished()).count();
            assert_eq!(finished, race.results().count());
        }

        let placed: HashSet<RunningHorseId> = race.results().map(RunningHorse::id).collect();
        assert_eq!(placed.len(), 6);
        let finished_events = race
            .clear_domain_events()
            .iter()
            .filter(|e| e.event_type() == EventType::RaceFinished)
            .count();
        assert_eq!(finished_events, 1);
    }

    #[test]
    fn leaderboard_sorts_by_position_with_stable_ties() {
        let mut race = Race::create(
            vec![horse("A", 10), horse("B", 100), horse("C", 10)],
            d(1200),
        )
        .unwrap();
        race.start().unwrap();
        race.turn(&mut ScriptedRandom::new(vec![0.5])).unwrap();

        let board = race.leaderboard();
        let names: Vec<&str> = board.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["B", "A", "C"]);
        let ranks: Vec<u32> = board.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, [1, 2, 3]);
        assert_eq!(board[0].position, 51);
        assert_eq!(board[1].position, 6);
        assert!((board[0].progress - 4.25).abs() < 1e-9);
    }

    #[test]
    fn record_roundtrip_restores_state() {
        let mut race = Race::create(vec![horse("A", 100), horse("B", 5)], d(1200)).unwrap();
        race.start().unwrap();
        let mut random = FixedRandom::new(0.99);
        for _ in 0..12 {
            race.turn(&mut random).unwrap();
        }

        let json = serde_json::to_string(&race.to_record()).unwrap();
        let record: RaceRecord = serde_json::from_str(&json).unwrap();
        let mut restored = Race::reconstitute(record);

        assert_eq!(restored.id(), race.id());
        assert_eq!(restored.turn_count(), 12);
        assert!(restored.is_started());
        assert!(restored.pending_events().is_empty());
        let winners: Vec<RunningHorseId> = restored.results().map(RunningHorse::id).collect();
        assert_eq!(winners, [race.horses()[0].id()]);

        restored.turn(&mut random).unwrap();
        assert_eq!(restored.turn_count(), 13);
        assert_eq!(restored.horses()[0].position(), 1200);
    }
}
