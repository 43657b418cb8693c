//! Collaborator interfaces — what the scheduler drives.
//!
//! The scheduler never inspects how sound is produced. It resolves ids
//! through a [`GraphResolver`] and talks to the returned capabilities:
//!
//! - [`Startable`] for notes (start/stop voices),
//! - [`Automatable`] for parameter curves,
//! - [`MeterAware`] for time-signature notifications.

pub mod memory;

pub use memory::{Call, MemoryGraph};

use std::sync::Arc;

use thiserror::Error;

use crate::automation::Curve;
use crate::event::Arg;
use crate::sequence::SequenceData;

/// Failure reported by an external target.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TargetError {
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("no voice playing for '{0}'")]
    NoVoice(String),
}

/// Opaque handle a [`Startable`] returns for a started voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(pub u64);

/// A parameter that accepts automation.
pub trait Automatable {
    fn automate(
        &mut self,
        time: f64,
        curve: Curve,
        value: f64,
        duration: f64,
    ) -> Result<(), TargetError>;

    fn value_at_time(&self, time: f64) -> f64;
}

/// A node that plays voices.
pub trait Startable {
    fn start(&mut self, time: f64, name: &Arg, value: f64) -> Result<VoiceHandle, TargetError>;

    /// Stop a voice. `voice` is the handle from the matching start, when
    /// the stop was paired with one.
    fn stop(&mut self, time: f64, name: &Arg, voice: Option<VoiceHandle>)
        -> Result<(), TargetError>;
}

/// A node that wants to know about meter changes.
pub trait MeterAware {
    fn meter_changed(&mut self, time: f64, bar: u32, subdivision: u32) -> Result<(), TargetError>;
}

/// Resolves ids found in events to live collaborators.
pub trait GraphResolver {
    fn startable(&mut self, id: &str) -> Option<&mut dyn Startable>;

    fn automatable(&mut self, id: &str, param: &str) -> Option<&mut dyn Automatable>;

    fn meter_aware(&mut self, _id: &str) -> Option<&mut dyn MeterAware> {
        None
    }

    fn sequence(&self, id: &str) -> Option<Arc<SequenceData>>;
}
