//! A horse's entry in one race.
//!
//! [`RunningHorse`] wraps an immutable [`Horse`] with the two pieces of
//! race-only state that change every turn: its position and whether it has
//! crossed the line. Both only move forward.

use paddock_types::{Condition, Horse, RunningHorseId};
use serde::{Deserialize, Serialize};

use crate::error::RaceError;
use crate::random::{RandomSource, clamp_unit};

/// One horse running one race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningHorse {
    id: RunningHorseId,
    horse: Horse,
    position: u32,
    is_finished: bool,
}

impl RunningHorse {
    /// Enter `horse` at the start line. A fresh entry id is generated when
    /// `id` is `None`.
    pub fn create(horse: Horse, id: Option<RunningHorseId>) -> Self {
        Self {
            id: id.unwrap_or_default(),
            horse,
            position: 0,
            is_finished: false,
        }
    }

    /// Rebuild an entry from saved state without validation.
    pub const fn reconstitute(
        id: RunningHorseId,
        horse: Horse,
        position: u32,
        is_finished: bool,
    ) -> Self {
        Self {
            id,
            horse,
            position,
            is_finished,
        }
    }

    /// Advance by one random draw and return the metres moved.
    ///
    /// The returned movement is the raw draw; the position itself is
    /// clamped to `race_length`, at which point the horse is finished.
    ///
    /// # Errors
    ///
    /// Returns [`RaceError::HorseAlreadyFinished`] if the horse has already
    /// crossed the line. The position is left untouched.
    pub fn run(
        &mut self,
        race_length: u32,
        random: &mut dyn RandomSource,
    ) -> Result<u32, RaceError> {
        if self.is_finished {
            return Err(RaceError::HorseAlreadyFinished {
                running_id: self.id,
            });
        }

        let movement = roll_movement(self.horse.condition(), random);
        let next = self.position.saturating_add(movement);
        if next >= race_length {
            self.position = race_length;
            self.is_finished = true;
        } else {
            self.position = next;
        }
        Ok(movement)
    }

    /// Percentage of `race_length` covered, clamped to `[0, 100]`.
    pub fn progress(&self, race_length: u32) -> f64 {
        if race_length == 0 {
            return if self.is_finished { 100.0 } else { 0.0 };
        }
        let percent = f64::from(self.position) / f64::from(race_length) * 100.0;
        percent.clamp(0.0, 100.0)
    }

    /// Entry identity.
    pub const fn id(&self) -> RunningHorseId {
        self.id
    }

    /// The horse behind this entry.
    pub const fn horse(&self) -> &Horse {
        &self.horse
    }

    /// Metres from the start.
    pub const fn position(&self) -> u32 {
        self.position
    }

    /// Whether the horse has crossed the line.
    pub const fn is_finished(&self) -> bool {
        self.is_finished
    }
}

impl PartialEq for RunningHorse {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RunningHorse {}

/// Uniform integer in `1..=condition`: `floor(unit * condition) + 1`.
fn roll_movement(condition: Condition, random: &mut dyn RandomSource) -> u32 {
    let ceiling = condition.value();
    let unit = clamp_unit(random.next_unit());
    // unit < 1.0, so the floor lies in 0..ceiling.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled = (unit * f64::from(ceiling)).floor() as u32;
    scaled.min(ceiling.saturating_sub(1)).saturating_add(1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::random::{FixedRandom, ScriptedRandom, SeededRandom};

    fn horse(condition: u32) -> Horse {
        Horse::create("Runner", "#123456", condition).unwrap()
    }

    #[test]
    fn create_starts_at_the_gate() {
        let id = RunningHorseId::new();
        let entry = RunningHorse::create(horse(10), Some(id));
        assert_eq!(entry.id(), id);
        assert_eq!(entry.position(), 0);
        assert!(!entry.is_finished());
    }

    #[test]
    fn movement_uses_floor_plus_one() {
        let mut entry = RunningHorse::create(horse(50), None);
        let moved = entry.run(1200, &mut FixedRandom::new(0.5)).unwrap();
        assert_eq!(moved, 26);
        assert_eq!(entry.position(), 26);

        let mut slow = RunningHorse::create(horse(100), None);
        assert_eq!(slow.run(1200, &mut FixedRandom::new(0.0)).unwrap(), 1);
        assert_eq!(slow.run(1200, &mut FixedRandom::new(0.99)).unwrap(), 100);
    }

    #[test]
    fn movement_stays_within_condition() {
        let mut random = SeededRandom::from_seed(99);
        for condition in [1, 2, 17, 50, 99, 100] {
            let mut entry = RunningHorse::create(horse(condition), None);
            for _ in 0..200 {
                let before = entry.position();
                let Ok(moved) = entry.run(u32::MAX, &mut random) else {
                    break;
                };
                assert!((1..=condition).contains(&moved));
                assert_eq!(entry.position(), before.saturating_add(moved));
            }
        }
    }

    #[test]
    fn extreme_draws_are_clamped() {
        let mut entry = RunningHorse::create(horse(30), None);
        let mut random = ScriptedRandom::new(vec![1.0, 7.5, -1.0, f64::INFINITY]);
        let moves: Vec<u32> = (0..4).map(|_| entry.run(10_000, &mut random).unwrap()).collect();
        assert_eq!(moves, [30, 30, 1, 1]);
    }

    #[test]
    fn finishing_clamps_position() {
        let mut entry = RunningHorse::create(horse(100), None);
        let mut random = FixedRandom::new(0.99);
        for _ in 0..11 {
            entry.run(1150, &mut random).unwrap();
        }
        assert!(!entry.is_finished());
        assert_eq!(entry.position(), 1100);

        let moved = entry.run(1150, &mut random).unwrap();
        assert_eq!(moved, 100);
        assert_eq!(entry.position(), 1150);
        assert!(entry.is_finished());
    }

    #[test]
    fn finished_horse_cannot_run() {
        let mut entry = RunningHorse::create(horse(100), None);
        let mut random = FixedRandom::new(0.99);
        entry.run(100, &mut random).unwrap();
        assert!(entry.is_finished());

        let err = entry.run(100, &mut random).unwrap_err();
        assert_eq!(
            err,
            RaceError::HorseAlreadyFinished {
                running_id: entry.id()
            }
        );
        assert_eq!(entry.position(), 100);
    }

    #[test]
    fn progress_is_a_clamped_percentage() {
        let entry = RunningHorse::reconstitute(RunningHorseId::new(), horse(5), 600, false);
        assert!((entry.progress(1200) - 50.0).abs() < f64::EPSILON);

        let overshoot = RunningHorse::reconstitute(RunningHorseId::new(), horse(5), 5000, true);
        assert!((overshoot.progress(1200) - 100.0).abs() < f64::EPSILON);
    }
}
