//! Sequence data — ordered event lists with nested child sequences.
//!
//! A [`SequenceData`] owns its events, kept sorted by beat, and snapshots of
//! the child sequences its `sequence` events may spawn. Children are shared
//! as `Arc`s so a playing child can keep its snapshot while the parent is
//! edited.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Handle to a sequence registered with the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId(pub usize);

impl SequenceId {
    /// The transport's own event list.
    pub const ROOT: SequenceId = SequenceId(0);
}

/// A beat-ordered event list plus nested sequences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub sequences: Vec<Arc<SequenceData>>,
}

impl SequenceData {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            events: Vec::new(),
            sequences: Vec::new(),
        }
    }

    /// Builder: add events, keeping beat order.
    pub fn with_events(mut self, events: impl IntoIterator<Item = Event>) -> Self {
        self.events.extend(events);
        self.sort();
        self
    }

    /// Builder: add a nested sequence.
    pub fn with_sequence(mut self, child: SequenceData) -> Self {
        self.sequences.push(Arc::new(child));
        self
    }

    /// Stable sort by beat; events on the same beat keep insertion order.
    pub fn sort(&mut self) {
        self.events.sort_by(|a, b| a.beat.total_cmp(&b.beat));
    }

    /// Insert after every event on or before its beat. Returns the index.
    pub fn insert(&mut self, event: Event) -> usize {
        let index = self.events.partition_point(|e| e.beat <= event.beat);
        self.events.insert(index, event);
        index
    }

    /// Look up a nested sequence by id.
    pub fn find_sequence(&self, id: &str) -> Option<&Arc<SequenceData>> {
        self.sequences.iter().find(|s| s.id == id)
    }

    /// Index of the first event at or after `beat`.
    pub fn index_at_beat(&self, beat: f64) -> usize {
        self.events.partition_point(|e| e.beat < beat)
    }
}
