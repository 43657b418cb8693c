//! Transport — the root clock: play/stop state, tempo curve and meter.
//!
//! The rate table is keyed by absolute clock time and is never rewound, so
//! its integrated *location* only grows. The transport maps that location
//! to musical beats by anchoring it at the start of each playback cycle:
//!
//! `beat(t) = start_beat + location(t) − location(start_time)`
//!
//! The anchor location is cached on first use and reset on every start.
//! Each start also purges rate points that ended before it, so the table
//! holds one cycle of tempo history at most.

use std::cell::Cell;

use tracing::debug;

use super::meter::{MeterEvent, MeterTable};
use super::rate::RateTable;
use crate::automation::{AutomationEvent, Curve};
use crate::config::SchedulerConfig;
use crate::error::{check_time, Result, SchedulerError};

/// Playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Playing,
}

/// Root musical clock.
#[derive(Debug)]
pub struct Transport {
    rate: RateTable,
    meter: MeterTable,
    state: PlayState,
    start_time: f64,
    start_beat: f64,
    start_location: Cell<Option<f64>>,
    stop_time: Option<f64>,
    /// Resume position while stopped.
    beat: f64,
}

impl Transport {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            rate: RateTable::new(config.default_rate, config.exponential_floor),
            meter: MeterTable::new(config.default_meter),
            state: PlayState::Stopped,
            start_time: 0.0,
            start_beat: 0.0,
            start_location: Cell::new(None),
            stop_time: None,
            beat: 0.0,
        }
    }

    /// Start playing at `time` from `beat`, or from the resume position.
    pub fn start(&mut self, time: f64, beat: Option<f64>) -> Result<()> {
        if self.state == PlayState::Playing {
            return Err(SchedulerError::state("transport is already playing"));
        }
        let time = check_time(time)?;
        let beat = check_time(beat.unwrap_or(self.beat))?;
        self.rate.purge(time)?;

        self.start_time = time;
        self.start_beat = beat;
        self.start_location.set(None);
        self.stop_time = None;
        self.state = PlayState::Playing;
        debug!(time, beat, "transport started");
        Ok(())
    }

    /// Stop at `time`, freezing the tempo there. Returns the stop beat.
    pub fn stop(&mut self, time: f64) -> Result<f64> {
        if self.state != PlayState::Playing {
            return Err(SchedulerError::state("transport stopped before it was started"));
        }
        let beat = self.beat_at_time(time)?;
        self.rate.hold(time)?;
        self.stop_time = Some(time);
        self.state = PlayState::Stopped;
        self.beat = beat;
        debug!(time, beat, "transport stopped");
        Ok(beat)
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn stop_time(&self) -> Option<f64> {
        self.stop_time
    }

    /// Beat the current playback cycle started from.
    pub fn start_beat(&self) -> f64 {
        self.start_beat
    }

    /// Beat playback resumes from.
    pub fn beat(&self) -> f64 {
        self.beat
    }

    /// Move the resume position. Only allowed while stopped.
    pub fn set_beat(&mut self, beat: f64) -> Result<()> {
        if self.is_playing() {
            return Err(SchedulerError::state("cannot move beat while playing"));
        }
        self.beat = check_time(beat)?;
        Ok(())
    }

    fn start_location(&self) -> Result<f64> {
        if let Some(location) = self.start_location.get() {
            return Ok(location);
        }
        let location = self.rate.beat_at(self.start_time)?;
        self.start_location.set(Some(location));
        Ok(location)
    }

    /// Rate-table location of a transport beat.
    fn location_at_beat(&self, beat: f64) -> Result<f64> {
        let beat = check_time(beat)?;
        let location = beat - self.start_beat + self.start_location()?;
        if location < 0.0 {
            return Err(SchedulerError::InvalidTime(beat));
        }
        Ok(location)
    }

    /// Beat at clock `time`. Times before the current start are rejected.
    pub fn beat_at_time(&self, time: f64) -> Result<f64> {
        let time = check_time(time)?;
        if time < self.start_time {
            return Err(SchedulerError::InvalidTime(time));
        }
        Ok(self.start_beat + self.rate.beat_at(time)? - self.start_location()?)
    }

    /// Clock time at which `beat` is reached.
    pub fn time_at_beat(&self, beat: f64) -> Result<f64> {
        self.rate.time_at_beat(self.location_at_beat(beat)?)
    }

    pub fn rate(&self) -> &RateTable {
        &self.rate
    }

    /// Write a beat-keyed rate change. Returns the clock time it lands on.
    pub fn set_rate_at_beat(&mut self, beat: f64, value: f64, curve: Curve) -> Result<f64> {
        let location = self.location_at_beat(beat)?;
        self.rate.insert_at_beat(location, value, curve)
    }

    /// Step the rate to `value` at clock `time`.
    pub fn install_rate(&mut self, time: f64, value: f64) -> Result<()> {
        self.rate.insert(AutomationEvent::step(time, value))
    }

    /// Tempo in beats per minute at `time`.
    pub fn tempo_at(&self, time: f64) -> f64 {
        self.rate.value_at(time) * 60.0
    }

    /// Schedule a tempo change in beats per minute at clock `time`.
    pub fn set_tempo(&mut self, time: f64, bpm: f64, curve: Curve) -> Result<()> {
        self.rate.insert(AutomationEvent::new(time, bpm / 60.0, curve))
    }

    pub fn meter(&self) -> &MeterTable {
        &self.meter
    }

    pub fn set_meter_at_beat(&mut self, beat: f64, bar: u32, subdivision: u32) -> Result<()> {
        self.meter.set_meter_at_beat(beat, bar, subdivision)
    }

    pub fn meter_at_beat(&self, beat: f64) -> MeterEvent {
        self.meter.meter_at_beat(beat)
    }

    pub fn bar_at_beat(&self, beat: f64) -> Result<f64> {
        self.meter.bar_at_beat(beat)
    }

    pub fn beat_at_bar(&self, bar: f64) -> Result<f64> {
        self.meter.beat_at_bar(bar)
    }
}
