//! Turn a [`ProgramConfig`] into a card of validated races.

use paddock_types::{Distance, Horse};
use tracing::debug;

use crate::config::{HorseConfig, ProgramConfig, RaceConfig};
use crate::error::RaceError;
use crate::race::Race;

/// A race on the card could not be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("race {index} on the card is invalid: {source}")]
pub struct ProgramError {
    /// Zero-based position of the race on the card.
    pub index: usize,
    /// What was wrong with it.
    pub source: RaceError,
}

/// Validate every configured race, in order. Each horse gets a fresh id,
/// so the same configured horse may appear in several races.
///
/// # Errors
///
/// Returns the first [`ProgramError`] found.
pub fn build_races(config: &ProgramConfig) -> Result<Vec<Race>, ProgramError> {
    config
        .races
        .iter()
        .enumerate()
        .map(|(index, race)| build_race(race).map_err(|source| ProgramError { index, source }))
        .collect()
}

fn build_race(config: &RaceConfig) -> Result<Race, RaceError> {
    let distance = Distance::new(config.distance)?;
    let horses = config
        .horses
        .iter()
        .map(build_horse)
        .collect::<Result<Vec<_>, _>>()?;
    let race = Race::create(horses, distance)?;
    debug!(race_id = %race.id(), distance = %distance, horses = race.horse_count(), "Race built");
    Ok(race)
}

fn build_horse(config: &HorseConfig) -> Result<Horse, RaceError> {
    Ok(Horse::create(&config.name, &config.color, config.condition)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use paddock_types::ValidationError;

    use super::*;

    fn horse(name: &str, condition: u32) -> HorseConfig {
        HorseConfig {
            name: name.to_string(),
            color: "#ABCDEF".to_string(),
            condition,
        }
    }

    #[test]
    fn default_card_builds() {
        let races = build_races(&ProgramConfig::default()).unwrap();
        assert_eq!(races.len(), 2);
        assert_eq!(races.first().unwrap().distance().meters(), 1200);
        assert!(races.iter().all(|r| !r.is_started()));
    }

    #[test]
    fn bad_distance_names_the_race() {
        let config = ProgramConfig {
            races: vec![
                RaceConfig {
                    distance: 1400,
                    horses: vec![horse("Ok", 50)],
                },
                RaceConfig {
                    distance: 1300,
                    horses: vec![horse("Ok", 50)],
                },
            ],
        };
        let err = build_races(&config).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(
            err.source,
            RaceError::InvalidHorse {
                source: ValidationError::InvalidDistance { meters: 1300 }
            }
        );
    }

    #[test]
    fn bad_horse_and_empty_lineup_are_rejected() {
        let bad_condition = ProgramConfig {
            races: vec![RaceConfig {
                distance: 1200,
                horses: vec![horse("Tired", 0)],
            }],
        };
        assert!(matches!(
            build_races(&bad_condition).unwrap_err().source,
            RaceError::InvalidHorse {
                source: ValidationError::ConditionOutOfRange { value: 0 }
            }
        ));

        let empty = ProgramConfig {
            races: vec![RaceConfig {
                distance: 1200,
                horses: Vec::new(),
            }],
        };
        assert_eq!(build_races(&empty).unwrap_err().source, RaceError::NoHorses);
    }
}
