//! Rate table — beat↔time integration under a tempo curve.
//!
//! The table holds automation points whose values are rates (beats per unit
//! of the time axis). A *location* is the integral of the rate from time 0,
//! so converting between time and location walks the segments, integrating
//! each one in closed form:
//!
//! | segment     | beats over `dt`                          |
//! |-------------|------------------------------------------|
//! | flat        | `r·dt`                                   |
//! | linear      | `r0·dt + a·dt²/2`                        |
//! | exponential | `D·r0·((r1/r0)^(dt/D) − 1) / ln(r1/r0)`  |
//!
//! Step points, and target points with no time constant, integrate as flat
//! segments at their starting rate. Decaying targets have no closed-form
//! inverse and are rejected.
//!
//! [`RateTable::purge`] drops points that can no longer affect the future and
//! folds the beats they covered into a base location, so conversions stay
//! proportional to the live points rather than the whole playback history.

use crate::automation::{self, curve, AutomationEvent, Curve};
use crate::error::{check_time, Result, SchedulerError};

/// Tolerance when matching a location against an existing point.
const LOCATION_EPSILON: f64 = 1e-9;

/// Shape of the rate between two consecutive points.
#[derive(Debug, Clone, Copy)]
enum Shape {
    Flat { rate: f64 },
    Linear { r0: f64, accel: f64 },
    Exponential { r0: f64, ln_k: f64, span: f64 },
}

impl Shape {
    /// Beats covered `dt` after the segment start.
    fn beats(self, dt: f64) -> f64 {
        match self {
            Shape::Flat { rate } => rate * dt,
            Shape::Linear { r0, accel } => r0 * dt + 0.5 * accel * dt * dt,
            Shape::Exponential { r0, ln_k, span } => span * r0 * (ln_k * dt / span).exp_m1() / ln_k,
        }
    }

    /// Time after the segment start at which `db` beats have been covered.
    fn duration(self, db: f64) -> f64 {
        match self {
            Shape::Flat { rate } => db / rate,
            Shape::Linear { r0, accel } => {
                if accel == 0.0 {
                    return db / r0;
                }
                let disc = (r0 * r0 + 2.0 * accel * db).max(0.0);
                2.0 * db / (r0 + disc.sqrt())
            }
            Shape::Exponential { r0, ln_k, span } => span * (db * ln_k / (span * r0)).ln_1p() / ln_k,
        }
    }
}

/// Piecewise tempo curve with beat↔time conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    events: Vec<AutomationEvent>,
    floor: f64,
    /// Location at the first retained point.
    base: f64,
}

impl RateTable {
    /// Create a table seeded with a step to `rate` at time 0.
    pub fn new(rate: f64, floor: f64) -> Self {
        Self {
            events: vec![AutomationEvent::step(0.0, rate)],
            floor,
            base: 0.0,
        }
    }

    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Time of the earliest retained point. Conversions before it fail.
    pub fn first_time(&self) -> f64 {
        self.events.first().map_or(0.0, |e| e.time)
    }

    /// Location of the earliest retained point.
    pub fn base(&self) -> f64 {
        self.base
    }

    fn check_retained(&self, time: f64) -> Result<f64> {
        let time = check_time(time)?;
        if time < self.first_time() {
            return Err(SchedulerError::InvalidTime(time));
        }
        Ok(time)
    }

    /// Rate at `time`.
    pub fn value_at(&self, time: f64) -> f64 {
        automation::value_at(&self.events, time, self.floor)
    }

    /// Write a time-keyed rate point.
    pub fn insert(&mut self, event: AutomationEvent) -> Result<()> {
        self.check_retained(event.time)?;
        check_rate(event.value)?;
        if event.curve == Curve::Target && event.duration > 0.0 {
            return Err(SchedulerError::MalformedEvent {
                event: format!("target rate {} over {}", event.value, event.duration),
                reason: "rate points cannot decay toward a target".into(),
            });
        }
        automation::insert(&mut self.events, event);
        Ok(())
    }

    /// Freeze the rate at `time`, discarding later points.
    pub fn hold(&mut self, time: f64) -> Result<f64> {
        let time = self.check_retained(time)?;
        Ok(automation::hold(&mut self.events, time, self.floor))
    }

    /// Drop points that no longer affect locations at or after `time`,
    /// keeping the point that governs it. Conversions at or after `time`
    /// are unchanged.
    pub fn purge(&mut self, time: f64) -> Result<()> {
        let time = self.check_retained(time)?;
        let mut events = self.events.clone();
        automation::purge(&mut events, time);
        if events.len() == self.events.len() {
            return Ok(());
        }
        let Some(first) = events.first() else {
            return Ok(());
        };
        self.base = self.beat_at(first.time)?;
        self.events = events;
        Ok(())
    }

    /// Segment starting at point `i`, with its end time if bounded.
    fn segment(&self, i: usize) -> (f64, Option<f64>, Shape) {
        let e0 = &self.events[i];
        let r0 = automation::value_at(&self.events[..=i], e0.time, self.floor);
        let Some(e1) = self.events.get(i + 1) else {
            return (e0.time, None, Shape::Flat { rate: r0 });
        };
        let span = e1.time - e0.time;
        let shape = match e1.curve {
            Curve::Linear if span > 0.0 => Shape::Linear {
                r0,
                accel: (e1.value - r0) / span,
            },
            Curve::Exponential
                if span > 0.0
                    && e1.value != r0
                    && curve::exponential_renderable(r0, e1.value, self.floor) =>
            {
                Shape::Exponential {
                    r0,
                    ln_k: (e1.value / r0).ln(),
                    span,
                }
            }
            _ => Shape::Flat { rate: r0 },
        };
        (e0.time, Some(e1.time), shape)
    }

    /// Location (integrated beats since time 0) at `time`.
    pub fn beat_at(&self, time: f64) -> Result<f64> {
        let time = self.check_retained(time)?;
        let mut location = self.base;
        for i in 0..self.events.len() {
            let (t0, t1, shape) = self.segment(i);
            if time < t0 {
                break;
            }
            match t1 {
                Some(t1) if time > t1 => location += shape.beats(t1 - t0),
                _ => return Ok(location + shape.beats(time - t0)),
            }
        }
        Ok(location)
    }

    /// Time at which the integrated location reaches `beat`.
    pub fn time_at_beat(&self, beat: f64) -> Result<f64> {
        let beat = check_time(beat)?;
        if beat < self.base {
            return Err(SchedulerError::InvalidTime(beat));
        }
        let mut location = self.base;
        for i in 0..self.events.len() {
            let (t0, t1, shape) = self.segment(i);
            if let Some(t1) = t1 {
                let covered = shape.beats(t1 - t0);
                if location + covered < beat {
                    location += covered;
                    continue;
                }
            }
            let time = t0 + shape.duration(beat - location);
            return finite_time(time, beat);
        }
        finite_time(f64::INFINITY, beat)
    }

    /// Write a rate point keyed by location rather than time.
    ///
    /// The point's time is solved so the ramp leading into it covers exactly
    /// the beats between the previous point and `location`. Points at or
    /// beyond `location` are discarded. Writing the same point twice is a
    /// no-op. Returns the solved time.
    pub fn insert_at_beat(&mut self, location: f64, value: f64, curve: Curve) -> Result<f64> {
        let location = check_time(location)?;
        if location < self.base {
            return Err(SchedulerError::InvalidTime(location));
        }
        check_rate(value)?;

        let first_time = self.first_time();
        let mut n = 0;
        let mut at = self.base;
        while n < self.events.len() {
            let (t0, t1, shape) = self.segment(n);
            if at > location - LOCATION_EPSILON {
                break;
            }
            match t1 {
                Some(t1) => at += shape.beats(t1 - t0),
                None => {
                    n += 1;
                    break;
                }
            }
            n += 1;
        }

        if let Some(existing) = self.events.get(n) {
            if (at - location).abs() < LOCATION_EPSILON && existing.value == value {
                return Ok(existing.time);
            }
        }
        self.events.truncate(n);

        let Some(prev) = self.events.last().copied() else {
            self.events.push(AutomationEvent::step(first_time, value));
            return Ok(first_time);
        };
        let prev_location = self.beat_at(prev.time)?;
        let r0 = self.value_at(prev.time);
        let db = (location - prev_location).max(0.0);
        let dt = match curve {
            Curve::Linear => 2.0 * db / (r0 + value),
            Curve::Exponential
                if value != r0 && curve::exponential_renderable(r0, value, self.floor) =>
            {
                db * (value / r0).ln() / (value - r0)
            }
            _ => db / r0,
        };
        let time = finite_time(prev.time + dt, location)?;
        let event = AutomationEvent {
            time,
            value,
            curve,
            duration: 0.0,
        };
        automation::insert(&mut self.events, event);
        Ok(time)
    }
}

fn check_rate(value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SchedulerError::MalformedEvent {
            event: format!("rate {value}"),
            reason: "rate must be a positive number".into(),
        })
    }
}

fn finite_time(time: f64, beat: f64) -> Result<f64> {
    if time.is_finite() {
        Ok(time)
    } else {
        Err(SchedulerError::InvalidTime(beat))
    }
}
