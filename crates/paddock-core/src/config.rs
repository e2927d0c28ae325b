//! Configuration loading and typed config structures for Paddock.
//!
//! The canonical configuration lives in `paddock-config.yaml` at the project
//! root. Every field has a default, so an empty or missing file yields a
//! runnable two-race card.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::random::{RandomSource, SeededRandom};

/// Environment variable that overrides `race_loop.tick_interval_ms`.
pub const TICK_INTERVAL_ENV: &str = "PADDOCK_TICK_INTERVAL_MS";

/// Environment variable that overrides `random.seed`.
pub const SEED_ENV: &str = "PADDOCK_SEED";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration, mirroring `paddock-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PaddockConfig {
    /// Driver timing.
    #[serde(default)]
    pub race_loop: RaceLoopConfig,

    /// Movement randomness.
    #[serde(default)]
    pub random: RandomConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// The card of races to run.
    #[serde(default)]
    pub program: ProgramConfig,
}

impl PaddockConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides:
    /// - `PADDOCK_TICK_INTERVAL_MS` overrides `race_loop.tick_interval_ms`
    /// - `PADDOCK_SEED` overrides `random.seed`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string. No overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Values that do not parse are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = lookup(TICK_INTERVAL_ENV).and_then(|v| v.trim().parse().ok()) {
            self.race_loop.tick_interval_ms = ms;
        }
        if let Some(seed) = lookup(SEED_ENV).and_then(|v| v.trim().parse().ok()) {
            self.random.seed = Some(seed);
        }
    }
}

/// Driver timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RaceLoopConfig {
    /// Real-time milliseconds between turns.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl RaceLoopConfig {
    /// The tick period as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for RaceLoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Movement randomness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RandomConfig {
    /// Fixed seed for replayable programs. Absent means OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl RandomConfig {
    /// Build the random source this config describes.
    pub fn source(&self) -> Box<dyn RandomSource> {
        match self.seed {
            Some(seed) => Box::new(SeededRandom::from_seed(seed)),
            None => Box::new(SeededRandom::from_entropy()),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// The card of races, run in order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProgramConfig {
    /// Races in running order.
    #[serde(default = "default_races")]
    pub races: Vec<RaceConfig>,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            races: default_races(),
        }
    }
}

/// One race on the card.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RaceConfig {
    /// Course length in metres: 1200 to 2200 in steps of 200.
    pub distance: u32,

    /// Lineup in gate order.
    pub horses: Vec<HorseConfig>,
}

/// One horse in a lineup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HorseConfig {
    /// Display name, 1 to 50 characters.
    pub name: String,

    /// `#RRGGBB` colour.
    pub color: String,

    /// Fitness from 1 to 100; the most metres the horse can move per turn.
    pub condition: u32,
}

impl HorseConfig {
    fn new(name: &str, color: &str, condition: u32) -> Self {
        Self {
            name: name.to_string(),
            color: color.to_string(),
            condition,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_tick_interval_ms() -> u64 {
    200
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_races() -> Vec<RaceConfig> {
    vec![
        RaceConfig {
            distance: 1200,
            horses: vec![
                HorseConfig::new("Thunder Road", "#C0392B", 82),
                HorseConfig::new("Silver Comet", "#BDC3C7", 76),
                HorseConfig::new("Night Owl", "#2C3E50", 68),
                HorseConfig::new("Lucky Clover", "#27AE60", 71),
            ],
        },
        RaceConfig {
            distance: 1600,
            horses: vec![
                HorseConfig::new("Desert Wind", "#E67E22", 88),
                HorseConfig::new("Blue Lagoon", "#2980B9", 64),
                HorseConfig::new("Golden Hour", "#F1C40F", 79),
                HorseConfig::new("Iron Duke", "#7F8C8D", 73),
                HorseConfig::new("Velvet Storm", "#8E44AD", 69),
            ],
        },
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PaddockConfig::default();
        assert_eq!(config.race_loop.tick_interval_ms, 200);
        assert_eq!(config.race_loop.tick_interval(), Duration::from_millis(200));
        assert_eq!(config.random.seed, None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.program.races.len(), 2);
        assert_eq!(config.program.races[1].horses.len(), 5);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r##"
race_loop:
  tick_interval_ms: 50
random:
  seed: 9
logging:
  level: debug
  format: json
program:
  races:
    - distance: 1800
      horses:
        - name: "Alpha"
          color: "#112233"
          condition: 40
        - name: "Beta"
          color: "#445566"
          condition: 60
"##;
        let config = PaddockConfig::parse(yaml).unwrap();
        assert_eq!(config.race_loop.tick_interval_ms, 50);
        assert_eq!(config.random.seed, Some(9));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.program.races.len(), 1);
        assert_eq!(config.program.races[0].distance, 1800);
        assert_eq!(config.program.races[0].horses[1].name, "Beta");
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = PaddockConfig::parse("random:\n  seed: 7\n").unwrap();
        assert_eq!(config.random.seed, Some(7));
        assert_eq!(config.race_loop.tick_interval_ms, 200);
        assert_eq!(config.program, ProgramConfig::default());
    }

    #[test]
    fn parse_empty_yaml() {
        assert_eq!(PaddockConfig::parse("").unwrap(), PaddockConfig::default());
    }

    #[test]
    fn overrides_replace_parsed_values() {
        let env: HashMap<&str, &str> =
            HashMap::from([(TICK_INTERVAL_ENV, "25"), (SEED_ENV, " 1234 ")]);
        let mut config = PaddockConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));
        assert_eq!(config.race_loop.tick_interval_ms, 25);
        assert_eq!(config.random.seed, Some(1234));
    }

    #[test]
    fn unparseable_overrides_are_ignored() {
        let mut config = PaddockConfig::default();
        config.apply_overrides(|_| Some("soon".to_string()));
        assert_eq!(config, PaddockConfig::default());
    }

    #[test]
    fn seeded_source_is_deterministic() {
        let random = RandomConfig { seed: Some(5) };
        let mut a = random.source();
        let mut b = random.source();
        assert_eq!(a.next_unit().to_bits(), b.next_unit().to_bits());
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("paddock-config.yaml");
        if path.exists() {
            let config = PaddockConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
