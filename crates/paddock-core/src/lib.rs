//! Race aggregate, turn algorithm, and race-loop driver for Paddock.
//!
//! A program is a card of races run one after another. Each race advances
//! its horses one random draw per turn until every horse has crossed the
//! line, raising domain events as it goes. The driver turns timer ticks
//! into turns and forwards the events to an event sink.
//!
//! # Modules
//!
//! - [`random`] -- [`RandomSource`] and its seeded, fixed and scripted
//!   implementations.
//! - [`running`] -- A horse's per-race state and movement rule.
//! - [`race`] -- The [`Race`] aggregate: start, turn, leaderboard.
//! - [`timer`] -- [`Timer`] seam with tokio and manual implementations.
//! - [`store`] -- [`RaceStore`] seam and the in-memory [`ProgramState`].
//! - [`driver`] -- [`RaceLoop`] and its spawned [`RaceLoopHandle`].
//! - [`config`] -- Configuration loading from `paddock-config.yaml`.
//! - [`program`] -- Build a card of races from configuration.
//!
//! [`RandomSource`]: random::RandomSource
//! [`Race`]: race::Race
//! [`Timer`]: timer::Timer
//! [`RaceStore`]: store::RaceStore
//! [`ProgramState`]: store::ProgramState
//! [`RaceLoop`]: driver::RaceLoop
//! [`RaceLoopHandle`]: driver::RaceLoopHandle

pub mod config;
pub mod driver;
pub mod error;
pub mod program;
pub mod race;
pub mod random;
pub mod running;
pub mod store;
pub mod timer;

pub use error::RaceError;
