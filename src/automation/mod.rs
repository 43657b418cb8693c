//! Curve evaluator — piecewise automation lists and their read-back.
//!
//! An automation list is a time-ordered `Vec<AutomationEvent>`. Each event's
//! curve describes how the value travels *into* that event: ramps
//! ([`Curve::Linear`], [`Curve::Exponential`]) interpolate from the previous
//! event, while [`Curve::Step`] and [`Curve::Target`] take effect at the
//! event's own time.
//!
//! Writes go through [`insert`] and [`hold`], both idempotent under repeated
//! identical calls.

pub mod curve;

pub use curve::{Curve, EXPONENTIAL_FLOOR};

use serde::{Deserialize, Serialize};

/// A single point of an automation list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutomationEvent {
    pub time: f64,
    pub value: f64,
    pub curve: Curve,
    /// Time constant, only meaningful for [`Curve::Target`].
    #[serde(default)]
    pub duration: f64,
}

impl AutomationEvent {
    pub fn new(time: f64, value: f64, curve: Curve) -> Self {
        Self {
            time,
            value,
            curve,
            duration: 0.0,
        }
    }

    pub fn step(time: f64, value: f64) -> Self {
        Self::new(time, value, Curve::Step)
    }

    pub fn target(time: f64, value: f64, duration: f64) -> Self {
        Self {
            time,
            value,
            curve: Curve::Target,
            duration,
        }
    }
}

/// Number of leading events with `time <= t`.
fn governing_len(events: &[AutomationEvent], t: f64) -> usize {
    events.partition_point(|e| e.time <= t)
}

/// Value contributed by `events[index]` alone at time `t >= events[index].time`.
///
/// Target events walk back to the value the list held when they began.
fn value_at_event(events: &[AutomationEvent], index: usize, t: f64, floor: f64) -> f64 {
    let event = &events[index];
    match event.curve {
        Curve::Target => {
            let prior = value_at(&events[..index], event.time, floor);
            curve::target(prior, event.value, event.time, event.duration, t)
        }
        _ => event.value,
    }
}

/// Instantaneous value of the automation list at time `t`.
///
/// Returns `0.0` before the first event.
pub fn value_at(events: &[AutomationEvent], t: f64, floor: f64) -> f64 {
    let n = governing_len(events, t);
    if n == 0 {
        return 0.0;
    }

    let i0 = n - 1;
    let e0 = &events[i0];
    let Some(e1) = events.get(n) else {
        return value_at_event(events, i0, t, floor);
    };

    match e1.curve {
        Curve::Linear => {
            let v0 = value_at_event(events, i0, e0.time, floor);
            curve::linear(v0, e1.value, e0.time, e1.time, t)
        }
        Curve::Exponential => {
            let v0 = value_at_event(events, i0, e0.time, floor);
            curve::exponential(v0, e1.value, e0.time, e1.time, t, floor)
        }
        Curve::Step | Curve::Target => value_at_event(events, i0, t, floor),
    }
}

/// Insert a point, replacing an existing point with the same time and curve.
///
/// Scans from the tail since automation is written append-mostly.
pub fn insert(events: &mut Vec<AutomationEvent>, event: AutomationEvent) {
    let mut n = events.len();
    while n > 0 && events[n - 1].time > event.time {
        n -= 1;
    }

    let mut j = n;
    while j > 0 && events[j - 1].time == event.time {
        if events[j - 1].curve == event.curve {
            events[j - 1] = event;
            return;
        }
        j -= 1;
    }

    events.insert(n, event);
}

/// Freeze the current trajectory at `t`.
///
/// Discards every point after `t`. A ramp in flight at `t` is cut short:
/// its point is retimed to `t` with the value reached there, so the shape
/// before `t` is unchanged. A target still decaying at `t` is frozen with a
/// step. Returns the frozen value.
pub fn hold(events: &mut Vec<AutomationEvent>, t: f64, floor: f64) -> f64 {
    let frozen = value_at(events, t, floor);
    let n = governing_len(events, t);

    if n > 0 && events.get(n).is_some_and(|e| e.curve.is_ramp()) {
        events[n].time = t;
        events[n].value = frozen;
        events.truncate(n + 1);
        return frozen;
    }

    events.truncate(n);
    if events.last().is_some_and(|e| e.curve == Curve::Target) {
        insert(events, AutomationEvent::step(t, frozen));
    }
    frozen
}

/// Drop points that can no longer influence values at or after `t`.
///
/// Keeps the point governing `t` together with any target chain it
/// depends on.
pub fn purge(events: &mut Vec<AutomationEvent>, t: f64) {
    let mut keep = governing_len(events, t).saturating_sub(1);
    while keep > 0 && events[keep].curve == Curve::Target {
        keep -= 1;
    }
    events.drain(..keep);
}
