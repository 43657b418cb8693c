//! Scheduler — the explicit context that owns every scheduling component.
//!
//! The [`Scheduler`] holds the [`Transport`], the [`LookaheadTimer`], the
//! command pool and one head per registered sequence. Sequence 0 is the
//! transport's own event list; further sequences run on local clocks
//! anchored to the transport when they start.
//!
//! The scheduler does **not** own the graph it drives. Callers pass a
//! [`GraphResolver`] into [`Scheduler::tick`], which keeps every call into
//! the core on the caller's thread.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::automation::Curve;
use crate::clock::{Clock, Frame, MeterEvent, Transport};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::event::{Arg, Event, EventKind};
use crate::sequence::{SequenceData, SequenceId};
use crate::sequencer::head::Head;
use crate::sequencer::{
    install_controls, CommandPool, FrameContext, HeadClock, HeadStatus, TickReport,
};
use crate::target::GraphResolver;
use crate::timer::{ListenerId, LookaheadTimer, TickSource};

/// A registered sequence and its read head.
struct Entry {
    data: Arc<SequenceData>,
    clock: HeadClock,
    head: Head,
}

/// Musical-time scheduler over a clock `C` and a tick source `S`.
pub struct Scheduler<C: Clock, S: TickSource> {
    clock: C,
    timer: LookaheadTimer<S, SequenceId>,
    listener: ListenerId,
    transport: Transport,
    pool: CommandPool,
    entries: Vec<Entry>,
    config: SchedulerConfig,
}

impl<C: Clock, S: TickSource> Scheduler<C, S> {
    pub fn new(clock: C, source: S, config: SchedulerConfig) -> Self {
        let mut timer = LookaheadTimer::new(source, &config);
        let listener = timer.add_listener();
        let root = Entry {
            data: Arc::new(SequenceData::new("root")),
            clock: HeadClock::Transport,
            head: Head::new("", true),
        };
        Self {
            clock,
            timer,
            listener,
            transport: Transport::new(&config),
            pool: CommandPool::new(),
            entries: vec![root],
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Command pool statistics.
    pub fn pool(&self) -> &CommandPool {
        &self.pool
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn ticker_mut(&mut self) -> &mut S {
        self.timer.source_mut()
    }

    /// Current time on the scheduler's clock.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    fn entry(&self, id: SequenceId) -> Result<&Entry> {
        self.entries
            .get(id.0)
            .ok_or_else(|| SchedulerError::reference("sequence", id.0.to_string()))
    }

    fn entry_mut(&mut self, id: SequenceId) -> Result<&mut Entry> {
        self.entries
            .get_mut(id.0)
            .ok_or_else(|| SchedulerError::reference("sequence", id.0.to_string()))
    }

    /// Replace the transport's event list and the node its events address.
    pub fn load_root(&mut self, data: SequenceData, target: &str) -> Result<()> {
        let root = &mut self.entries[SequenceId::ROOT.0];
        if root.head.status() != HeadStatus::Idle {
            return Err(SchedulerError::state("cannot load while the transport is playing"));
        }
        let mut data = data;
        data.sort();
        root.data = Arc::new(data);
        root.head = Head::new(target, true);
        Ok(())
    }

    /// Register a sequence that plays on its own clock. Its rate events
    /// shape that clock rather than the transport's tempo.
    pub fn add_sequence(&mut self, data: SequenceData, target: &str) -> SequenceId {
        let mut data = data;
        data.sort();
        self.entries.push(Entry {
            data: Arc::new(data),
            clock: HeadClock::Transport,
            head: Head::new(target, false),
        });
        SequenceId(self.entries.len() - 1)
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&SequenceData> {
        self.entries.get(id.0).map(|e| e.data.as_ref())
    }

    pub fn status(&self, id: SequenceId) -> Option<HeadStatus> {
        self.entries.get(id.0).map(|e| e.head.status())
    }

    /// Stop commands still carried by every head.
    pub fn pending_stops(&self) -> usize {
        self.entries.iter().map(|e| e.head.pending_stops()).sum()
    }

    /// Whether every head has drained.
    pub fn is_idle(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.head.status() == HeadStatus::Idle)
    }

    /// Start the transport at `time` (default now) from `beat` (default
    /// the resume position) and begin reading the root sequence.
    ///
    /// The timer is requested first; if anything after that fails the
    /// request is withdrawn and the transport is left stopped.
    pub fn start(&mut self, time: Option<f64>, beat: Option<f64>) -> Result<()> {
        match self.entries[SequenceId::ROOT.0].head.status() {
            HeadStatus::Idle => {}
            HeadStatus::Running => return Err(SchedulerError::state("transport is already playing")),
            HeadStatus::Draining => return Err(SchedulerError::state("transport is still draining")),
        }
        let time = time.unwrap_or_else(|| self.clock.now());
        let request = self.timer.request(self.listener, SequenceId::ROOT)?;
        if let Err(error) = self.transport.start(time, beat) {
            self.timer.cancel(self.listener, request);
            return Err(error);
        }
        let beat = self.transport.start_beat();

        let root = &mut self.entries[SequenceId::ROOT.0];
        let mut errors = Vec::new();
        install_controls(&mut self.transport, &root.data.events, beat, time, &mut errors);
        for error in errors {
            warn!(%error, "control event skipped");
        }
        root.head.start(&root.data, beat, time)?;
        info!(time, beat, tempo = self.transport.tempo_at(time), "transport started");
        Ok(())
    }

    /// Stop the transport at `time` (default now). Every playing sequence
    /// drains up to the stop beat, then flushes its pending stops.
    pub fn stop(&mut self, time: Option<f64>) -> Result<f64> {
        let time = time.unwrap_or_else(|| self.clock.now());
        let beat = self.transport.stop(time)?;
        for entry in &mut self.entries {
            if entry.head.status() != HeadStatus::Running {
                continue;
            }
            let local = entry.clock.from_parent(beat)?;
            entry.head.request_stop(time, local)?;
        }
        info!(time, beat, "transport stopped");
        Ok(beat)
    }

    /// Start a registered sequence at `time` from its local `beat`,
    /// starting the transport first if it is stopped.
    pub fn start_sequence(&mut self, id: SequenceId, time: Option<f64>, beat: f64) -> Result<()> {
        if id == SequenceId::ROOT {
            return self.start(time, Some(beat));
        }
        let time = time.unwrap_or_else(|| self.clock.now());
        let status = self.entry(id)?.head.status();
        if status != HeadStatus::Idle {
            return Err(SchedulerError::state(format!(
                "sequence {} is {status:?}",
                id.0
            )));
        }
        let playing = self.transport.is_playing();
        // A stopped transport starts from its resume position at `time`.
        let anchor = if playing {
            self.transport.beat_at_time(time)?
        } else {
            self.transport.beat()
        };
        let floor = self.config.exponential_floor;

        let mut errors = Vec::new();
        let clock = HeadClock::local(anchor, beat, &self.entry(id)?.data.events, floor, &mut errors)?;
        for error in errors {
            warn!(%error, "rate event skipped");
        }

        let request = self.timer.request(self.listener, id)?;
        if !playing {
            if let Err(error) = self.transport.start(time, None) {
                self.timer.cancel(self.listener, request);
                return Err(error);
            }
        }
        let entry = self.entry_mut(id)?;
        entry.clock = clock;
        entry.head.start(&entry.data, beat, time)?;
        debug!(sequence = id.0, time, anchor, "sequence scheduled");
        Ok(())
    }

    /// Stop one sequence at `time` (default now).
    pub fn stop_sequence(&mut self, id: SequenceId, time: Option<f64>) -> Result<()> {
        let time = time.unwrap_or_else(|| self.clock.now());
        let beat = self.transport.beat_at_time(time)?;
        let entry = self.entry_mut(id)?;
        let local = entry.clock.from_parent(beat)?;
        entry.head.request_stop(time, local)
    }

    /// Record an event into sequence `id` at clock `time`. Note and
    /// sequence durations are given in seconds and stored in beats.
    /// Returns the index the event was inserted at.
    pub fn record(
        &mut self,
        id: SequenceId,
        time: f64,
        kind: EventKind,
        mut args: Vec<Arg>,
    ) -> Result<usize> {
        let parent_beat = self.transport.beat_at_time(time)?;
        let transport = &self.transport;
        let entry = self
            .entries
            .get_mut(id.0)
            .ok_or_else(|| SchedulerError::reference("sequence", id.0.to_string()))?;
        let beat = entry.clock.from_parent(parent_beat)?;

        if kind.has_duration() {
            if let Some(seconds) = args.get(2).and_then(Arg::as_number) {
                if seconds.is_finite() && seconds >= 0.0 {
                    let end = transport
                        .beat_at_time(time + seconds)
                        .and_then(|b| entry.clock.from_parent(b))?;
                    args[2] = Arg::Number(end - beat);
                }
            }
        }

        let event = Event::new(beat, kind, args);
        event.data()?;
        debug!(sequence = id.0, %event, "recorded");
        let index = Arc::make_mut(&mut entry.data).insert(event);
        entry.head.on_insert(index, beat);
        Ok(index)
    }

    pub fn beat_at_time(&self, time: f64) -> Result<f64> {
        self.transport.beat_at_time(time)
    }

    pub fn time_at_beat(&self, beat: f64) -> Result<f64> {
        self.transport.time_at_beat(beat)
    }

    pub fn bar_at_beat(&self, beat: f64) -> Result<f64> {
        self.transport.bar_at_beat(beat)
    }

    pub fn beat_at_bar(&self, bar: f64) -> Result<f64> {
        self.transport.beat_at_bar(bar)
    }

    pub fn meter_at_beat(&self, beat: f64) -> MeterEvent {
        self.transport.meter_at_beat(beat)
    }

    /// Tempo in beats per minute right now.
    pub fn tempo(&self) -> f64 {
        self.transport.tempo_at(self.clock.now())
    }

    pub fn set_tempo(&mut self, time: f64, bpm: f64, curve: Curve) -> Result<()> {
        self.transport.set_tempo(time, bpm, curve)
    }

    /// Poll the tick source; run one frame for every playing sequence if
    /// a tick arrived.
    pub fn tick(&mut self, graph: &mut dyn GraphResolver) -> TickReport {
        let now = self.clock.now();
        let Self {
            timer,
            transport,
            pool,
            entries,
            config,
            ..
        } = self;
        let mut report = TickReport::default();
        let mut ctx = FrameContext {
            transport,
            pool,
            graph,
            config,
            report: &mut report,
        };
        timer.poll(now, |_, id, t2| process_entry(entries, id, t2, &mut ctx));
        report
    }

    /// Run one frame now, without waiting for the tick source.
    pub fn run_frame(&mut self, graph: &mut dyn GraphResolver) -> TickReport {
        let now = self.clock.now();
        let Self {
            timer,
            transport,
            pool,
            entries,
            config,
            ..
        } = self;
        let mut report = TickReport::default();
        let mut ctx = FrameContext {
            transport,
            pool,
            graph,
            config,
            report: &mut report,
        };
        timer.fire(now, |_, id, t2| process_entry(entries, id, t2, &mut ctx));
        report
    }
}

/// Run the frame ending at `t2` for one sequence. Returns the payload to
/// re-queue while the sequence still needs frames.
fn process_entry(
    entries: &mut [Entry],
    id: SequenceId,
    t2: f64,
    ctx: &mut FrameContext<'_>,
) -> Option<SequenceId> {
    let entry = entries.get_mut(id.0)?;
    if entry.head.status() == HeadStatus::Idle {
        return None;
    }
    let t1 = entry.head.last_time();
    if t2 <= t1 {
        return Some(id);
    }

    let b2 = match ctx
        .transport
        .beat_at_time(t2)
        .and_then(|beat| entry.clock.from_parent(beat))
    {
        Ok(beat) => beat,
        Err(error) => {
            ctx.report.error(error);
            return Some(id);
        }
    };
    let frame = Frame {
        t1,
        t2,
        b1: entry.head.last_beat(),
        b2,
        start_time: entry.head.start_time(),
    };

    let Entry { data, clock, head } = entry;
    let map = |beat: f64| clock.to_parent(beat);
    head.process(data, &frame, &map, ctx);

    if head.status() == HeadStatus::Idle {
        debug!(sequence = id.0, node = head.target(), "sequence idle");
        None
    } else {
        Some(id)
    }
}
