//! Scheduler configuration — timer period, default tempo and meter, loaded
//! from ~/.beatline/scheduler.yaml.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::automation::EXPONENTIAL_FLOOR;
use crate::clock::MeterEvent;
use crate::error::{Result, SchedulerError};

/// Tunables for the scheduling core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between lookahead timer ticks.
    #[serde(default = "default_tick_duration")]
    pub tick_duration: f64,
    /// Extra seconds scheduled beyond the next tick.
    #[serde(default = "default_lookahead")]
    pub lookahead: f64,
    /// Tempo in beats per second before any rate event.
    #[serde(default = "default_rate")]
    pub default_rate: f64,
    /// Meter before any meter event.
    #[serde(default)]
    pub default_meter: MeterEvent,
    /// Magnitude below which exponential ramps degrade to steps.
    #[serde(default = "default_exponential_floor")]
    pub exponential_floor: f64,
    /// Exponential param events pre-cued past the frame end, per sequence.
    #[serde(default = "default_precue_limit")]
    pub precue_limit: usize,
}

fn default_tick_duration() -> f64 {
    0.24
}

fn default_lookahead() -> f64 {
    0.12
}

fn default_rate() -> f64 {
    2.0
}

fn default_exponential_floor() -> f64 {
    EXPONENTIAL_FLOOR
}

fn default_precue_limit() -> usize {
    1
}

impl SchedulerConfig {
    /// Load config from the standard path (~/.beatline/scheduler.yaml).
    /// Returns None if the file doesn't exist or doesn't parse.
    pub fn load() -> Option<Self> {
        let home = dirs::home_dir()?;
        let path = home.join(".beatline").join("scheduler.yaml");
        Self::load_from(path).ok()
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tick_duration > 0.0) {
            return Err(SchedulerError::Config(format!(
                "tick_duration must be positive, got {}",
                self.tick_duration
            )));
        }
        if !(self.lookahead >= 0.0) {
            return Err(SchedulerError::Config(format!(
                "lookahead must not be negative, got {}",
                self.lookahead
            )));
        }
        if !(self.default_rate > 0.0) || !self.default_rate.is_finite() {
            return Err(SchedulerError::Config(format!(
                "default_rate must be positive, got {}",
                self.default_rate
            )));
        }
        if self.default_meter.bar == 0 || self.default_meter.subdivision == 0 {
            return Err(SchedulerError::Config(
                "default_meter bar and subdivision must be positive".into(),
            ));
        }
        if !(self.exponential_floor >= 0.0) {
            return Err(SchedulerError::Config(format!(
                "exponential_floor must not be negative, got {}",
                self.exponential_floor
            )));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_duration: default_tick_duration(),
            lookahead: default_lookahead(),
            default_rate: default_rate(),
            default_meter: MeterEvent::default(),
            exponential_floor: default_exponential_floor(),
            precue_limit: default_precue_limit(),
        }
    }
}
