//! Radio time units
//!
//! The scheduler core counts time in radio ticks: one tick per slot of the
//! configured numerology. Timers are armed in ticks and the external tick
//! source advances the logical clock one tick at a time.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Logical radio time, counted in ticks since the clock started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RadioTick(u64);

impl RadioTick {
    /// Creates a tick with the given value
    pub fn new(tick: u64) -> Self {
        Self(tick)
    }

    /// The first tick (tick 0)
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the tick value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Advances to the next tick
    pub fn next(&mut self) {
        self.0 += 1;
    }

    /// Returns a tick advanced by N ticks without mutating
    pub fn advanced_by(&self, n: u64) -> Self {
        Self(self.0.saturating_add(n))
    }

    /// Number of ticks from `earlier` to `self`, zero if `earlier` is later
    pub fn since(&self, earlier: RadioTick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for RadioTick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tick({})", self.0)
    }
}

impl From<u64> for RadioTick {
    fn from(tick: u64) -> Self {
        Self::new(tick)
    }
}

impl From<RadioTick> for u64 {
    fn from(tick: RadioTick) -> u64 {
        tick.0
    }
}

/// Tick cadence configuration.
///
/// A tick is one slot: 1 ms at numerology 0, halved for each numerology step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickConfig {
    /// Subcarrier spacing numerology (0..=4)
    pub numerology: u8,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self { numerology: 0 }
    }
}

impl TickConfig {
    /// Highest supported numerology
    pub const MAX_NUMEROLOGY: u8 = 4;

    /// Creates a tick configuration for the given numerology
    pub fn new(numerology: u8) -> Self {
        Self { numerology }
    }

    /// Numerology used for timing, capped at [`Self::MAX_NUMEROLOGY`].
    pub fn effective_numerology(&self) -> u8 {
        self.numerology.min(Self::MAX_NUMEROLOGY)
    }

    /// Number of ticks per millisecond
    pub fn ticks_per_ms(&self) -> u64 {
        1u64 << self.effective_numerology()
    }

    /// Wall-clock duration of one tick
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1000 >> self.effective_numerology())
    }

    /// Converts milliseconds to a tick count
    pub fn ms_to_ticks(&self, ms: u64) -> u64 {
        ms.saturating_mul(self.ticks_per_ms())
    }

    /// Converts a tick count to milliseconds, rounding down
    pub fn ticks_to_ms(&self, ticks: u64) -> u64 {
        ticks / self.ticks_per_ms()
    }
}
