//! Beatline — a musical-time scheduler.
//!
//! Converts between wall-clock seconds and musical beats under a variable
//! tempo, evaluates automation curves, and reads nested event sequences
//! ahead of real time through a lookahead timer, handing resolved commands
//! to an external sound graph.

pub mod automation;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod scheduler;
pub mod sequence;
pub mod sequencer;
pub mod target;
pub mod timer;

pub use automation::{AutomationEvent, Curve};
pub use clock::{Clock, ManualClock, SystemClock, Transport};
pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use event::{Arg, Event, EventKind};
pub use scheduler::Scheduler;
pub use sequence::{SequenceData, SequenceId};
pub use sequencer::{HeadStatus, TickReport};
pub use target::{GraphResolver, MemoryGraph};
pub use timer::{ManualTicker, ThreadTicker, TickSource};
