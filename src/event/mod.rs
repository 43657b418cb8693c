//! Persisted sequence events.
//!
//! An [`Event`] is a beat-stamped tuple `(beat, kind, ...args)`. Events are
//! stored loosely typed, exactly as they serialize, and validated on use
//! through [`Event::data`], which checks arity and argument types for the
//! event's kind.
//!
//! Serialized form is a flat array, e.g. `[0.5, "note", 60, 0.8, 0.25]`.

pub mod types;

pub use types::{Arg, EventKind};

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::automation::Curve;
use crate::error::{Result, SchedulerError};

/// A beat-stamped sequence event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub beat: f64,
    pub kind: EventKind,
    pub args: Vec<Arg>,
}

/// Validated, typed view of an event's arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventData<'a> {
    Rate {
        value: f64,
        curve: Curve,
    },
    Meter {
        bar: u32,
        subdivision: u32,
    },
    Note {
        name: &'a Arg,
        value: f64,
        duration: f64,
    },
    NoteOn {
        name: &'a Arg,
        value: f64,
    },
    NoteOff {
        name: &'a Arg,
    },
    Param {
        name: &'a str,
        value: f64,
        curve: Curve,
        duration: f64,
    },
    Sequence {
        id: &'a Arg,
        target: &'a Arg,
        duration: f64,
    },
    SequenceOff {
        id: &'a Arg,
    },
}

impl Event {
    pub fn new(beat: f64, kind: EventKind, args: Vec<Arg>) -> Self {
        Self { beat, kind, args }
    }

    pub fn note(beat: f64, name: impl Into<Arg>, value: f64, duration: f64) -> Self {
        Self::new(
            beat,
            EventKind::Note,
            vec![name.into(), value.into(), duration.into()],
        )
    }

    pub fn param(beat: f64, name: &str, value: f64, curve: Curve) -> Self {
        Self::new(
            beat,
            EventKind::Param,
            vec![name.into(), value.into(), curve.name().into()],
        )
    }

    pub fn rate(beat: f64, value: f64, curve: Curve) -> Self {
        Self::new(beat, EventKind::Rate, vec![value.into(), curve.name().into()])
    }

    pub fn meter(beat: f64, bar: u32, subdivision: u32) -> Self {
        Self::new(
            beat,
            EventKind::Meter,
            vec![(bar as f64).into(), (subdivision as f64).into()],
        )
    }

    pub fn sequence(beat: f64, id: impl Into<Arg>, target: impl Into<Arg>, duration: f64) -> Self {
        Self::new(
            beat,
            EventKind::Sequence,
            vec![id.into(), target.into(), duration.into()],
        )
    }

    /// Name used to collapse same-target writes within one frame.
    pub fn dedup_name(&self) -> Option<&str> {
        match self.kind {
            EventKind::Param => self.args.first().and_then(Arg::as_text),
            _ => None,
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> SchedulerError {
        SchedulerError::MalformedEvent {
            event: self.to_string(),
            reason: reason.into(),
        }
    }

    fn number(&self, index: usize, what: &str) -> Result<f64> {
        match self.args.get(index).and_then(Arg::as_number) {
            Some(n) if n.is_finite() => Ok(n),
            _ => Err(self.malformed(format!("{what} must be a finite number"))),
        }
    }

    fn duration(&self, index: usize) -> Result<f64> {
        let duration = self.number(index, "duration")?;
        if duration < 0.0 {
            return Err(self.malformed("duration must not be negative"));
        }
        Ok(duration)
    }

    fn count(&self, index: usize, what: &str) -> Result<u32> {
        let n = self.number(index, what)?;
        if n < 1.0 || n.fract() != 0.0 || n > u32::MAX as f64 {
            return Err(self.malformed(format!("{what} must be a positive integer")));
        }
        Ok(n as u32)
    }

    fn curve(&self, index: usize) -> Result<Curve> {
        match self.args.get(index) {
            None => Ok(Curve::Step),
            Some(Arg::Text(name)) => Curve::from_name(name)
                .ok_or_else(|| self.malformed(format!("unknown curve '{name}'"))),
            Some(Arg::Number(_)) => Err(self.malformed("curve must be a name")),
        }
    }

    /// Validate the event and return its typed view.
    pub fn data(&self) -> Result<EventData<'_>> {
        if !self.beat.is_finite() || self.beat < 0.0 {
            return Err(self.malformed("beat must be a non-negative number"));
        }
        let (min, max) = self.kind.arity();
        let n = self.args.len();
        if n < min || n > max {
            let expected = if min == max {
                format!("{min}")
            } else if max == usize::MAX {
                format!("at least {min}")
            } else {
                format!("{min} to {max}")
            };
            return Err(self.malformed(format!(
                "{} takes {expected} arguments, got {n}",
                self.kind
            )));
        }

        let args = &self.args;
        let data = match self.kind {
            EventKind::Rate => EventData::Rate {
                value: self.number(0, "rate")?,
                curve: self.curve(1)?,
            },
            EventKind::Meter => EventData::Meter {
                bar: self.count(0, "bar")?,
                subdivision: self.count(1, "subdivision")?,
            },
            EventKind::Note => EventData::Note {
                name: &args[0],
                value: self.number(1, "value")?,
                duration: self.duration(2)?,
            },
            EventKind::NoteOn => EventData::NoteOn {
                name: &args[0],
                value: self.number(1, "value")?,
            },
            EventKind::NoteOff => EventData::NoteOff { name: &args[0] },
            EventKind::Param => {
                let name = args[0]
                    .as_text()
                    .ok_or_else(|| self.malformed("param name must be text"))?;
                let curve = self.curve(2)?;
                let duration = if n > 3 { self.duration(3)? } else { 0.0 };
                if curve == Curve::Target && duration <= 0.0 {
                    return Err(self.malformed("target curve needs a positive duration"));
                }
                EventData::Param {
                    name,
                    value: self.number(1, "value")?,
                    curve,
                    duration,
                }
            }
            EventKind::Sequence => EventData::Sequence {
                id: &args[0],
                target: &args[1],
                duration: self.duration(2)?,
            },
            EventKind::SequenceOff => EventData::SequenceOff { id: &args[0] },
        };
        Ok(data)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.beat, self.kind)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.args.len() + 2))?;
        seq.serialize_element(&self.beat)?;
        seq.serialize_element(&self.kind)?;
        for arg in &self.args {
            seq.serialize_element(arg)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EventVisitor;

        impl<'de> Visitor<'de> for EventVisitor {
            type Value = Event;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an event tuple [beat, kind, ...args]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Event, A::Error> {
                let beat: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let kind: EventKind = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let mut args = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(arg) = seq.next_element::<Arg>()? {
                    args.push(arg);
                }
                Ok(Event { beat, kind, args })
            }
        }

        deserializer.deserialize_seq(EventVisitor)
    }
}
