//! Random draws for horse movement.
//!
//! Movement is `floor(unit * condition) + 1`, so the whole statistical
//! character of a race depends on the unit draw. Every draw goes through
//! [`RandomSource`], which lets programs be seeded for replay and lets tests
//! pin the draw to a known value.

use rand::rngs::SmallRng;
use rand::{Rng as _, SeedableRng as _};

/// A source of uniform draws in `[0, 1)`.
pub trait RandomSource: Send {
    /// Return the next draw. Values outside `[0, 1)` are clamped by the
    /// caller.
    fn next_unit(&mut self) -> f64;
}

/// Pseudo-random source backed by [`SmallRng`].
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: SmallRng,
}

impl SeededRandom {
    /// Deterministic source: the same seed replays the same races.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Source seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: SmallRng::from_os_rng(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// Source that always returns the same draw.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(f64);

impl FixedRandom {
    /// Pin every draw to `value`.
    pub const fn new(value: f64) -> Self {
        Self(value)
    }
}

impl RandomSource for FixedRandom {
    fn next_unit(&mut self) -> f64 {
        self.0
    }
}

/// Source that cycles through a fixed list of draws. An empty script
/// always yields `0.0`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRandom {
    values: Vec<f64>,
    cursor: usize,
}

impl ScriptedRandom {
    /// Cycle through `values` in order.
    pub const fn new(values: Vec<f64>) -> Self {
        Self { values, cursor: 0 }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_unit(&mut self) -> f64 {
        let value = self.values.get(self.cursor).copied().unwrap_or(0.0);
        self.cursor = self
            .cursor
            .saturating_add(1)
            .checked_rem(self.values.len())
            .unwrap_or(0);
        value
    }
}

/// Largest `f64` strictly below `1.0`.
const MAX_UNIT: f64 = f64::from_bits(0x3FEF_FFFF_FFFF_FFFF);

/// Clamp a raw draw into `[0, 1)`. Non-finite draws become `0.0`.
pub(crate) fn clamp_unit(raw: f64) -> f64 {
    if raw.is_finite() {
        raw.clamp(0.0, MAX_UNIT)
    } else {
        0.0
    }
}
