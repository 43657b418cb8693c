//! Commands and the free-list pool that owns them.
//!
//! A [`Command`] is a resolved event: beat, clock time and the arguments
//! its target needs. Commands live in a [`CommandPool`] slot for their whole
//! life and are referred to by [`CommandId`]; slots are recycled through a
//! free list so steady-state playback does not allocate new commands.

use crate::automation::Curve;
use crate::event::{Arg, EventKind};
use crate::target::VoiceHandle;

/// Index of a pooled command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(usize);

/// A resolved, dispatchable instruction.
#[derive(Debug, Clone)]
pub struct Command {
    pub beat: f64,
    pub time: f64,
    pub kind: EventKind,
    pub name: Arg,
    pub value: f64,
    pub curve: Curve,
    /// Beats for paired kinds, time constant in seconds for target curves.
    pub duration: f64,
    /// The other half of a start/stop pair.
    pub pair: Option<CommandId>,
    pub voice: Option<VoiceHandle>,
}

impl Default for Command {
    fn default() -> Self {
        Self {
            beat: 0.0,
            time: 0.0,
            kind: EventKind::NoteOn,
            name: Arg::Number(0.0),
            value: 0.0,
            curve: Curve::Step,
            duration: 0.0,
            pair: None,
            voice: None,
        }
    }
}

impl Command {
    /// Reset every field, keeping the name's buffer when possible.
    pub fn fill(&mut self, beat: f64, kind: EventKind, name: &Arg, value: f64) {
        self.beat = beat;
        self.time = 0.0;
        self.kind = kind;
        self.name.clone_from(name);
        self.value = value;
        self.curve = Curve::Step;
        self.duration = 0.0;
        self.pair = None;
        self.voice = None;
    }
}

/// Arena of commands with a free list.
#[derive(Debug, Default)]
pub struct CommandPool {
    slots: Vec<Command>,
    in_use: Vec<bool>,
    free: Vec<CommandId>,
}

impl CommandPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a slot from the free list, growing the arena if it is empty.
    pub fn acquire(&mut self) -> CommandId {
        if let Some(id) = self.free.pop() {
            self.in_use[id.0] = true;
            return id;
        }
        self.slots.push(Command::default());
        self.in_use.push(true);
        CommandId(self.slots.len() - 1)
    }

    /// Return a slot to the free list.
    ///
    /// Releasing a slot twice is a bug; debug builds panic, release builds
    /// ignore the second release.
    pub fn release(&mut self, id: CommandId) {
        debug_assert!(self.in_use[id.0], "command {id:?} released twice");
        if !self.in_use[id.0] {
            return;
        }
        self.in_use[id.0] = false;
        self.free.push(id);
    }

    pub fn get(&self, id: CommandId) -> &Command {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: CommandId) -> &mut Command {
        &mut self.slots[id.0]
    }

    /// Total commands ever allocated.
    pub fn created(&self) -> usize {
        self.slots.len()
    }

    /// Commands waiting on the free list.
    pub fn free(&self) -> usize {
        self.free.len()
    }

    /// Commands currently acquired.
    pub fn outstanding(&self) -> usize {
        self.created() - self.free()
    }
}
