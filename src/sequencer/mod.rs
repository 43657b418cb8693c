//! Sequencer — per-frame distribution of sequence events.
//!
//! Each playing sequence has a [`head::Head`] that walks its events inside
//! a `[b1, b2)` beat window once per frame:
//!
//! 1. advance a monotonic cursor to `b1`;
//! 2. apply control events, buffer the rest (last param write per name wins);
//! 3. pre-cue exponential param events just past `b2`;
//! 4. dispatch carried stop commands, then the buffered events, pairing
//!    notes and nested sequences with stop commands;
//! 5. recurse into child sequences on their own beat axis.
//!
//! Heads map their local beats to transport beats through a [`HeadClock`],
//! and from there to clock time through the [`Transport`].

pub mod command;
pub(crate) mod distribute;
pub mod head;

pub use command::{Command, CommandId, CommandPool};
pub use head::HeadStatus;

use tracing::{error, warn};

use crate::automation::Curve;
use crate::clock::{RateTable, Transport};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::event::{Event, EventData, EventKind};
use crate::target::GraphResolver;

/// What one scheduler tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Sequence frames processed, nested ones included.
    pub frames: usize,
    /// Commands sent on to targets or applied to child sequences.
    pub dispatched: usize,
    /// Failures met while processing; the rest of each frame still ran.
    pub errors: Vec<SchedulerError>,
}

impl TickReport {
    pub(crate) fn error(&mut self, error: SchedulerError) {
        if error.is_event_scoped() {
            warn!(%error, "event skipped");
        } else {
            error!(%error, "frame step failed");
        }
        self.errors.push(error);
    }
}

/// Shared state threaded through one frame of processing.
pub(crate) struct FrameContext<'a> {
    pub transport: &'a mut Transport,
    pub pool: &'a mut CommandPool,
    pub graph: &'a mut dyn GraphResolver,
    pub config: &'a SchedulerConfig,
    pub report: &'a mut TickReport,
}

/// Maps a head's local beats onto its parent's beats.
#[derive(Debug)]
pub enum HeadClock {
    /// Local beats are transport beats.
    Transport,
    /// Local beats follow a private rate curve, keyed by parent beats
    /// elapsed since local beat 0. Local beat `b` sits at parent beat
    /// `start + T(b) − origin`, where `T` is the curve's time-at-beat.
    Local {
        start: f64,
        origin: f64,
        rate: RateTable,
    },
}

impl HeadClock {
    /// Build a local clock from a sequence's rate events. Playback begins
    /// at local `beat`, which is pinned to parent beat `start`.
    pub fn local(
        start: f64,
        beat: f64,
        events: &[Event],
        floor: f64,
        errors: &mut Vec<SchedulerError>,
    ) -> Result<Self> {
        let mut rate = RateTable::new(1.0, floor);
        for event in events.iter().filter(|e| e.kind == EventKind::Rate) {
            match event.data() {
                Ok(EventData::Rate { value, curve }) => {
                    if let Err(error) = rate.insert_at_beat(event.beat, value, curve) {
                        errors.push(error);
                    }
                }
                Ok(_) => {}
                Err(error) => errors.push(error),
            }
        }
        let origin = rate.time_at_beat(beat)?;
        Ok(HeadClock::Local {
            start,
            origin,
            rate,
        })
    }

    pub fn to_parent(&self, beat: f64) -> Result<f64> {
        match self {
            HeadClock::Transport => Ok(beat),
            HeadClock::Local {
                start,
                origin,
                rate,
            } => Ok(start + rate.time_at_beat(beat)? - origin),
        }
    }

    /// Local beat at parent beat `beat`; parent beats before the anchor
    /// clamp to it.
    pub fn from_parent(&self, beat: f64) -> Result<f64> {
        match self {
            HeadClock::Transport => Ok(beat),
            HeadClock::Local {
                start,
                origin,
                rate,
            } => rate.beat_at((beat - start + origin).max(0.0)),
        }
    }
}

/// Install the transport-level controls of the root event list when
/// playback starts at `beat`/`time`.
///
/// The tempo in force at `beat` becomes a step at `time`; later rate events
/// are written ahead so ramps are known before they begin. Meter events
/// are applied in full.
pub(crate) fn install_controls(
    transport: &mut Transport,
    events: &[Event],
    beat: f64,
    time: f64,
    errors: &mut Vec<SchedulerError>,
) {
    let mut before: Option<(f64, f64)> = None;
    let mut ramp_into: Option<(f64, f64, Curve)> = None;
    let mut later: Vec<(f64, f64, Curve)> = Vec::new();

    for event in events {
        match event.data() {
            Ok(EventData::Rate { value, .. }) if event.beat <= beat => {
                before = Some((event.beat, value));
            }
            Ok(EventData::Rate { value, curve }) => {
                if later.is_empty() && curve.is_ramp() {
                    ramp_into = Some((event.beat, value, curve));
                }
                later.push((event.beat, value, curve));
            }
            Ok(EventData::Meter { bar, subdivision }) => {
                if let Err(error) = transport.set_meter_at_beat(event.beat, bar, subdivision) {
                    errors.push(error);
                }
            }
            Ok(_) => {}
            Err(error) if event.kind.is_control() => errors.push(error),
            Err(_) => {}
        }
    }

    if let Some((from_beat, from_value)) = before {
        let value = match ramp_into {
            Some((to_beat, to_value, curve)) => {
                ramp_value_at(from_beat, from_value, to_beat, to_value, curve, beat, transport)
            }
            None => from_value,
        };
        if let Err(error) = transport.install_rate(time, value) {
            errors.push(error);
        }
    }

    for (event_beat, value, curve) in later {
        if let Err(error) = transport.set_rate_at_beat(event_beat, value, curve) {
            errors.push(error);
        }
    }
}

/// Rate reached at `beat` on a ramp from `(b0, r0)` to `(b1, r1)`.
fn ramp_value_at(
    b0: f64,
    r0: f64,
    b1: f64,
    r1: f64,
    curve: Curve,
    beat: f64,
    transport: &Transport,
) -> f64 {
    let floor = transport.rate().floor();
    let mut ramp = RateTable::new(r0, floor);
    let solved = ramp
        .insert_at_beat(b1 - b0, r1, curve)
        .and_then(|_| ramp.time_at_beat(beat - b0));
    match solved {
        Ok(time) => ramp.value_at(time),
        Err(_) => r0,
    }
}
