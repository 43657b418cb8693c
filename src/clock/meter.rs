//! Meter table — bar accounting over time-signature changes.
//!
//! Each [`MeterEvent`] sets the bar length (in beats) from its beat onward.
//! Bars are counted segment by segment, so a meter change that falls
//! mid-bar shortens that bar rather than renumbering earlier ones.

use serde::{Deserialize, Serialize};

use crate::error::{check_time, Result, SchedulerError};

/// Tolerance for floating-point bar boundaries.
const BAR_EPSILON: f64 = 1e-12;

/// A time-signature change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterEvent {
    #[serde(default)]
    pub beat: f64,
    /// Bar length in beats.
    pub bar: u32,
    /// Beat subdivision, informational for meter-aware targets.
    #[serde(default = "default_subdivision")]
    pub subdivision: u32,
}

fn default_subdivision() -> u32 {
    1
}

impl MeterEvent {
    pub fn new(beat: f64, bar: u32, subdivision: u32) -> Self {
        Self {
            beat,
            bar,
            subdivision,
        }
    }

    fn validate(&self) -> Result<()> {
        check_time(self.beat)?;
        if self.bar == 0 || self.subdivision == 0 {
            return Err(SchedulerError::MalformedEvent {
                event: format!("{} meter {} {}", self.beat, self.bar, self.subdivision),
                reason: "bar and subdivision must be positive".into(),
            });
        }
        Ok(())
    }
}

impl Default for MeterEvent {
    fn default() -> Self {
        Self::new(0.0, 4, 1)
    }
}

/// Ordered list of meter changes, always starting at beat 0.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterTable {
    events: Vec<MeterEvent>,
}

impl MeterTable {
    /// Create a table whose meter at beat 0 is `initial`.
    pub fn new(initial: MeterEvent) -> Self {
        Self {
            events: vec![MeterEvent { beat: 0.0, ..initial }],
        }
    }

    /// Build a table from explicit events. A default 4/1 meter fills in
    /// when no event sits at beat 0.
    pub fn from_events(events: impl IntoIterator<Item = MeterEvent>) -> Result<Self> {
        let mut table = Self::new(MeterEvent::default());
        let mut events: Vec<MeterEvent> = events.into_iter().collect();
        events.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        for event in events {
            table.set_meter_at_beat(event.beat, event.bar, event.subdivision)?;
        }
        Ok(table)
    }

    pub fn events(&self) -> &[MeterEvent] {
        &self.events
    }

    /// Install a meter at `beat`, discarding every meter at or after it.
    /// Writing a meter that is already present changes nothing.
    pub fn set_meter_at_beat(&mut self, beat: f64, bar: u32, subdivision: u32) -> Result<()> {
        let event = MeterEvent::new(beat, bar, subdivision);
        event.validate()?;
        if self.events.contains(&event) {
            return Ok(());
        }
        let keep = self.events.partition_point(|e| e.beat < beat).max(1);
        if beat <= 0.0 {
            self.events[0] = event;
            self.events.truncate(1);
        } else {
            self.events.truncate(keep);
            self.events.push(event);
        }
        Ok(())
    }

    /// The meter governing `beat`.
    pub fn meter_at_beat(&self, beat: f64) -> MeterEvent {
        let n = self.events.partition_point(|e| e.beat <= beat).max(1);
        self.events[n - 1]
    }

    /// Whole bars elapsed at `beat`.
    pub fn bar_at_beat(&self, beat: f64) -> Result<f64> {
        let beat = check_time(beat)?;
        let mut bars = 0.0;
        let mut meter = self.events[0];
        for event in &self.events[1..] {
            if event.beat > beat {
                break;
            }
            bars += (event.beat - meter.beat) / meter.bar as f64;
            meter = *event;
        }
        bars += (beat - meter.beat) / meter.bar as f64;
        Ok((bars + BAR_EPSILON).floor())
    }

    /// Beat at which `bar` begins.
    pub fn beat_at_bar(&self, bar: f64) -> Result<f64> {
        let bar = check_time(bar)?;
        let mut bars = 0.0;
        let mut meter = self.events[0];
        for event in &self.events[1..] {
            let bars_at_event = bars + (event.beat - meter.beat) / meter.bar as f64;
            if bars_at_event > bar + BAR_EPSILON {
                break;
            }
            bars = bars_at_event;
            meter = *event;
        }
        Ok(meter.beat + (bar - bars) * meter.bar as f64)
    }
}

impl Default for MeterTable {
    fn default() -> Self {
        Self::new(MeterEvent::default())
    }
}
