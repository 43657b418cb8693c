//! Event kinds and argument values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of a sequence event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Rate,
    Meter,
    Note,
    NoteOn,
    NoteOff,
    Param,
    Sequence,
    SequenceOff,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Rate => "rate",
            EventKind::Meter => "meter",
            EventKind::Note => "note",
            EventKind::NoteOn => "noteon",
            EventKind::NoteOff => "noteoff",
            EventKind::Param => "param",
            EventKind::Sequence => "sequence",
            EventKind::SequenceOff => "sequenceoff",
        }
    }

    /// Control events retune the clock instead of reaching a target.
    pub fn is_control(self) -> bool {
        matches!(self, EventKind::Rate | EventKind::Meter)
    }

    /// Kinds that expand into a start/stop command pair.
    pub fn has_duration(self) -> bool {
        matches!(self, EventKind::Note | EventKind::Sequence)
    }

    /// Kind of the stop half of a paired command.
    pub fn stop_kind(self) -> Option<EventKind> {
        match self {
            EventKind::Note => Some(EventKind::NoteOff),
            EventKind::Sequence => Some(EventKind::SequenceOff),
            _ => None,
        }
    }

    /// Accepted argument counts, inclusive.
    pub fn arity(self) -> (usize, usize) {
        match self {
            EventKind::Rate => (1, 2),
            EventKind::Meter => (2, 2),
            EventKind::Note => (3, 3),
            EventKind::NoteOn => (2, 2),
            EventKind::NoteOff => (1, 1),
            EventKind::Param => (2, 4),
            EventKind::Sequence => (3, usize::MAX),
            EventKind::SequenceOff => (1, 1),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single event argument: a number or a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    Number(f64),
    Text(String),
}

impl Arg {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Arg::Number(n) => Some(*n),
            Arg::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Text(s) => Some(s),
            Arg::Number(_) => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Number(n) => write!(f, "{n}"),
            Arg::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Arg {
    fn from(n: f64) -> Self {
        Arg::Number(n)
    }
}

impl From<i32> for Arg {
    fn from(n: i32) -> Self {
        Arg::Number(n as f64)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}
