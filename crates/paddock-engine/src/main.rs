//! Race engine binary for the Paddock simulation.
//!
//! Loads a card of races from configuration and runs it in real time,
//! narrating every race through tracing.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `paddock-config.yaml` (or `PADDOCK_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build and validate the card of races
//! 4. Wire the event bus and the race reporter
//! 5. Spawn the race loop on a tokio timer and start it
//! 6. Wait for the card to finish or for Ctrl-C
//! 7. Shut the loop down and log the results

mod error;
mod reporter;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use paddock_core::config::{LogFormat, LoggingConfig, PaddockConfig};
use paddock_core::driver::RaceLoop;
use paddock_core::program;
use paddock_core::store::ProgramState;
use paddock_core::timer::TokioTimer;
use paddock_events::{EventBus, SharedHandler};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::reporter::RaceReporter;

/// Environment variable naming the configuration file.
const CONFIG_PATH_ENV: &str = "PADDOCK_CONFIG";

/// Configuration file used when `PADDOCK_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "paddock-config.yaml";

/// Application entry point for the race engine.
///
/// # Errors
///
/// Returns an error if configuration, the card of races, or the race loop
/// fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration. Logging depends on it, so report later.
    let (config, config_path, found) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("paddock-engine starting");
    if found {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        tick_interval_ms = config.race_loop.tick_interval_ms,
        seed = ?config.random.seed,
        races = config.program.races.len(),
        "Engine configured"
    );

    // 3. Build the card.
    let races = program::build_races(&config.program)?;

    // 4. Event bus and reporter.
    let bus = EventBus::new();
    let reporter = Arc::new(RaceReporter::new());
    let _reporter_subscription = bus.subscribe_all(Arc::clone(&reporter) as SharedHandler);

    // 5. Race loop.
    let timer = TokioTimer::current()?;
    let handle = RaceLoop::new(ProgramState::new(races), timer, bus, config.random.source())
        .with_tick_interval(config.race_loop.tick_interval())
        .spawn();
    handle.start().await?;

    // 6. Run until the card is done or the operator interrupts.
    tokio::select! {
        done = handle.wait_until_complete() => done?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!("Interrupted, stopping race loop");
        }
    }

    // 7. Shut down and report.
    let snapshot = handle.snapshot().await?;
    handle.shutdown().await?;
    reporter.log_summary();

    info!(
        race_index = snapshot.race_index,
        race_count = snapshot.race_count,
        complete = snapshot.is_complete,
        "paddock-engine shutdown complete"
    );
    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Load configuration from `PADDOCK_CONFIG` or `paddock-config.yaml`,
/// falling back to defaults when the file does not exist. Returns the
/// path consulted and whether it was found.
fn load_config() -> Result<(PaddockConfig, PathBuf, bool), EngineError> {
    let config_path = std::env::var_os(CONFIG_PATH_ENV)
        .map_or_else(|| Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), PathBuf::from);
    if config_path.exists() {
        let config = PaddockConfig::from_file(&config_path)?;
        Ok((config, config_path, true))
    } else {
        let mut config = PaddockConfig::default();
        config.apply_env_overrides();
        Ok((config, config_path, false))
    }
}
