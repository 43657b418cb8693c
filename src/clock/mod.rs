//! Musical clocks — wall time sources, scheduling frames and beat↔time maps.
//!
//! - [`Clock`] supplies "now" in seconds on a monotonic axis.
//! - [`RateTable`] integrates a tempo curve to convert between seconds and beats.
//! - [`MeterTable`] counts bars over time-signature changes.
//! - [`Transport`] anchors a rate table to a play/stop state machine.

pub mod meter;
pub mod rate;
pub mod transport;

pub use meter::{MeterEvent, MeterTable};
pub use rate::RateTable;
pub use transport::{PlayState, Transport};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A monotonic source of the current time in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Wall clock measured from its own creation.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, time: f64) {
        self.bits.store(time.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// One scheduling window: real time `[t1, t2)` and beat time `[b1, b2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub t1: f64,
    pub t2: f64,
    pub b1: f64,
    pub b2: f64,
    /// Time at which the owning sequence started.
    pub start_time: f64,
}

impl Frame {
    /// Whether `beat` falls inside the half-open beat window.
    pub fn contains_beat(&self, beat: f64) -> bool {
        beat >= self.b1 && beat < self.b2
    }
}
