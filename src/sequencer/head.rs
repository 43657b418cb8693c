//! Sequence head — the read position of one playing sequence.
//!
//! A head moves `Idle → Running → Draining → Idle`. While running it
//! reads its events frame by frame; once a stop is requested it keeps
//! reading up to the stop beat, then flushes every carried stop command
//! and its children before going idle.

use std::mem;
use std::sync::Arc;

use tracing::debug;

use super::command::CommandId;
use super::distribute::distribute;
use super::{FrameContext, HeadClock};
use crate::automation::Curve;
use crate::clock::Frame;
use crate::error::{Result, SchedulerError};
use crate::event::{Arg, EventData, EventKind};
use crate::sequence::SequenceData;

/// Lifecycle of a sequence head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadStatus {
    Idle,
    Running,
    /// Stopped, still reading up to the stop beat.
    Draining,
}

/// Maps a head's local beat to a transport beat.
pub(crate) type BeatMap<'a> = dyn Fn(f64) -> Result<f64> + 'a;

/// A nested sequence spawned by a `sequence` event.
struct Child {
    id: String,
    /// The `sequence` command that started it, held until its stop fires.
    start: CommandId,
    data: Arc<SequenceData>,
    clock: HeadClock,
    head: Head,
}

pub(crate) struct Head {
    status: HeadStatus,
    target: String,
    /// Whether rate events write the transport's tempo.
    controls_rate: bool,
    cursor: usize,
    last_beat: f64,
    last_time: f64,
    start_time: f64,
    /// Requested stop as `(time, local beat)`.
    stop: Option<(f64, f64)>,
    /// Event indices buffered for this frame.
    buffer: Vec<usize>,
    /// Event indices already dispatched ahead of their frame.
    precued: Vec<usize>,
    /// Stop commands waiting for their beat.
    stops: Vec<CommandId>,
    due: Vec<CommandId>,
    children: Vec<Child>,
}

impl Head {
    pub fn new(target: impl Into<String>, controls_rate: bool) -> Self {
        Self {
            status: HeadStatus::Idle,
            target: target.into(),
            controls_rate,
            cursor: 0,
            last_beat: 0.0,
            last_time: 0.0,
            start_time: 0.0,
            stop: None,
            buffer: Vec::new(),
            precued: Vec::new(),
            stops: Vec::new(),
            due: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn status(&self) -> HeadStatus {
        self.status
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn last_beat(&self) -> f64 {
        self.last_beat
    }

    pub fn last_time(&self) -> f64 {
        self.last_time
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Stop commands carried to a later frame, nested heads included.
    pub fn pending_stops(&self) -> usize {
        self.stops.len()
            + self
                .children
                .iter()
                .map(|c| c.head.pending_stops())
                .sum::<usize>()
    }

    /// Begin reading `data` from local `beat` at clock `time`.
    pub fn start(&mut self, data: &SequenceData, beat: f64, time: f64) -> Result<()> {
        match self.status {
            HeadStatus::Running => return Err(SchedulerError::state("sequence is already playing")),
            HeadStatus::Draining => return Err(SchedulerError::state("sequence is still draining")),
            HeadStatus::Idle => {}
        }
        self.cursor = data.index_at_beat(beat);
        self.last_beat = beat;
        self.last_time = time;
        self.start_time = time;
        self.stop = None;
        self.buffer.clear();
        self.precued.clear();
        self.status = HeadStatus::Running;
        debug!(node = %self.target, beat, time, "sequence started");
        Ok(())
    }

    /// Ask the head to stop at local `beat` (clock `time`).
    pub fn request_stop(&mut self, time: f64, beat: f64) -> Result<()> {
        match self.status {
            HeadStatus::Idle => Err(SchedulerError::state(
                "sequence stopped before it was started",
            )),
            HeadStatus::Draining => {
                // An earlier stop wins.
                if self.stop.is_some_and(|(_, b)| beat < b) {
                    self.stop = Some((time.max(self.start_time), beat));
                }
                Ok(())
            }
            HeadStatus::Running => {
                self.stop = Some((time.max(self.start_time), beat));
                self.status = HeadStatus::Draining;
                debug!(node = %self.target, beat, time, "sequence draining");
                Ok(())
            }
        }
    }

    /// Keep the cursor on the same event after `index` was inserted.
    pub fn on_insert(&mut self, index: usize, beat: f64) {
        if index < self.cursor || (index == self.cursor && beat < self.last_beat) {
            self.cursor += 1;
        }
        for precued in &mut self.precued {
            if *precued >= index {
                *precued += 1;
            }
        }
    }

    /// Process one frame. `frame.b1`/`frame.b2` are local beats; `map`
    /// converts local beats to transport beats.
    pub fn process(
        &mut self,
        data: &SequenceData,
        frame: &Frame,
        map: &BeatMap<'_>,
        ctx: &mut FrameContext<'_>,
    ) {
        if self.status == HeadStatus::Idle {
            return;
        }
        let b1 = self.last_beat;
        let stop_beat = self.stop.map(|(_, beat)| beat);
        let end = stop_beat.map_or(frame.b2, |beat| frame.b2.min(beat)).max(b1);
        let window = Frame {
            b1,
            b2: end,
            ..*frame
        };

        self.scan(data, &window, map, ctx);
        self.precue(data, stop_beat, ctx.config.precue_limit);

        self.dispatch_due_stops(end, map, ctx);
        let buffer = mem::take(&mut self.buffer);
        for &index in &buffer {
            if let Err(error) = self.dispatch_event(data, index, map, ctx) {
                ctx.report.error(error);
            }
        }
        self.buffer = buffer;
        self.buffer.clear();
        self.dispatch_due_stops(end, map, ctx);

        self.process_children(frame, end, map, ctx);

        self.last_beat = end;
        self.last_time = frame.t2;
        ctx.report.frames += 1;

        if let Some((time, beat)) = self.stop {
            if frame.b2 >= beat {
                self.flush(time, ctx);
            }
        }
    }

    /// Walk events inside `window`: apply controls, buffer the rest.
    fn scan(
        &mut self,
        data: &SequenceData,
        window: &Frame,
        map: &BeatMap<'_>,
        ctx: &mut FrameContext<'_>,
    ) {
        let events = &data.events;
        while self.cursor < events.len() && events[self.cursor].beat < window.b1 {
            self.cursor += 1;
        }

        while let Some(event) = events.get(self.cursor) {
            if !window.contains_beat(event.beat) {
                break;
            }
            let index = self.cursor;
            self.cursor += 1;
            if self.precued.contains(&index) {
                continue;
            }

            let applied = match event.data() {
                Err(error) => Err(error),
                Ok(EventData::Rate { value, curve }) => {
                    if self.controls_rate {
                        map(event.beat)
                            .and_then(|beat| ctx.transport.set_rate_at_beat(beat, value, curve))
                            .map(drop)
                    } else {
                        Ok(())
                    }
                }
                Ok(EventData::Meter { bar, subdivision }) => {
                    self.apply_meter(event.beat, bar, subdivision, map, ctx)
                }
                Ok(_) => {
                    if let Some(name) = event.dedup_name() {
                        self.buffer
                            .retain(|&i| events[i].dedup_name() != Some(name));
                    }
                    self.buffer.push(index);
                    Ok(())
                }
            };
            if let Err(error) = applied {
                ctx.report.error(error);
            }
        }

        let cursor = self.cursor;
        self.precued.retain(|&i| i >= cursor);
    }

    /// Buffer exponential param ramps just past the frame so their
    /// destination reaches the target before the ramp begins. At most
    /// `limit` events are inspected and the scan ends at the first
    /// non-param event.
    fn precue(&mut self, data: &SequenceData, stop_beat: Option<f64>, limit: usize) {
        for (index, event) in data.events.iter().enumerate().skip(self.cursor).take(limit) {
            if event.kind != EventKind::Param || stop_beat.is_some_and(|beat| event.beat >= beat) {
                break;
            }
            if self.precued.contains(&index) {
                continue;
            }
            if let Ok(EventData::Param {
                curve: Curve::Exponential,
                ..
            }) = event.data()
            {
                self.precued.push(index);
                self.buffer.push(index);
            }
        }
    }

    fn apply_meter(
        &self,
        beat: f64,
        bar: u32,
        subdivision: u32,
        map: &BeatMap<'_>,
        ctx: &mut FrameContext<'_>,
    ) -> Result<()> {
        let beat = map(beat)?;
        ctx.transport.set_meter_at_beat(beat, bar, subdivision)?;
        if let Some(node) = ctx.graph.meter_aware(&self.target) {
            let time = ctx.transport.time_at_beat(beat)?;
            node.meter_changed(time, bar, subdivision)
                .map_err(|source| SchedulerError::Target {
                    target: self.target.clone(),
                    time,
                    source,
                })?;
        }
        Ok(())
    }

    fn time_at(beat: f64, map: &BeatMap<'_>, ctx: &FrameContext<'_>) -> Result<f64> {
        ctx.transport.time_at_beat(map(beat)?)
    }

    fn dispatch_event(
        &mut self,
        data: &SequenceData,
        index: usize,
        map: &BeatMap<'_>,
        ctx: &mut FrameContext<'_>,
    ) -> Result<()> {
        let event = &data.events[index];
        let beat = event.beat;
        let time = Self::time_at(beat, map, ctx)?.max(self.start_time);

        match event.data()? {
            EventData::Note {
                name,
                value,
                duration,
            } => self.start_note(beat, time, name, value, duration, ctx),
            EventData::NoteOn { name, value } => {
                self.send(beat, time, EventKind::NoteOn, name, value, Curve::Step, 0.0, ctx)
            }
            EventData::NoteOff { name } => {
                self.send(beat, time, EventKind::NoteOff, name, 0.0, Curve::Step, 0.0, ctx)
            }
            EventData::Param {
                value,
                curve,
                duration,
                ..
            } => {
                let seconds = if duration > 0.0 {
                    Self::time_at(beat + duration, map, ctx)? - time
                } else {
                    0.0
                };
                self.send(beat, time, EventKind::Param, &event.args[0], value, curve, seconds, ctx)
            }
            EventData::Sequence {
                id,
                target,
                duration,
            } => self.start_child(data, beat, time, id, target, duration, ctx),
            EventData::SequenceOff { id } => {
                let key = id.to_string();
                for child in self.children.iter_mut().filter(|c| c.id == key) {
                    if child.head.status == HeadStatus::Running {
                        let local = child.clock.from_parent(beat)?;
                        child.head.request_stop(time, local)?;
                    }
                }
                ctx.report.dispatched += 1;
                Ok(())
            }
            EventData::Rate { .. } | EventData::Meter { .. } => Ok(()),
        }
    }

    /// Distribute a command that has no stop half, then release it.
    #[allow(clippy::too_many_arguments)]
    fn send(
        &self,
        beat: f64,
        time: f64,
        kind: EventKind,
        name: &Arg,
        value: f64,
        curve: Curve,
        duration: f64,
        ctx: &mut FrameContext<'_>,
    ) -> Result<()> {
        let id = ctx.pool.acquire();
        let command = ctx.pool.get_mut(id);
        command.fill(beat, kind, name, value);
        command.time = time;
        command.curve = curve;
        command.duration = duration;
        let result = distribute(&mut *ctx.graph, &self.target, command);
        ctx.pool.release(id);
        result?;
        ctx.report.dispatched += 1;
        Ok(())
    }

    /// Acquire the stop half of `start` and carry it until its beat.
    fn pair_stop(&mut self, start: CommandId, beat: f64, name: &Arg, ctx: &mut FrameContext<'_>) {
        let (kind, voice) = {
            let command = ctx.pool.get(start);
            (command.kind.stop_kind(), command.voice)
        };
        let Some(kind) = kind else {
            return;
        };
        let stop = ctx.pool.acquire();
        let command = ctx.pool.get_mut(stop);
        command.fill(beat, kind, name, 0.0);
        command.pair = Some(start);
        command.voice = voice;
        ctx.pool.get_mut(start).pair = Some(stop);
        self.stops.push(stop);
    }

    fn start_note(
        &mut self,
        beat: f64,
        time: f64,
        name: &Arg,
        value: f64,
        duration: f64,
        ctx: &mut FrameContext<'_>,
    ) -> Result<()> {
        let start = ctx.pool.acquire();
        let command = ctx.pool.get_mut(start);
        command.fill(beat, EventKind::Note, name, value);
        command.time = time;
        command.duration = duration;
        if let Err(error) = distribute(&mut *ctx.graph, &self.target, command) {
            ctx.pool.release(start);
            return Err(error);
        }
        ctx.report.dispatched += 1;
        self.pair_stop(start, beat + duration, name, ctx);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn start_child(
        &mut self,
        data: &SequenceData,
        beat: f64,
        time: f64,
        id: &Arg,
        target: &Arg,
        duration: f64,
        ctx: &mut FrameContext<'_>,
    ) -> Result<()> {
        let key = id.to_string();
        let child_data = match data.find_sequence(&key) {
            Some(found) => Arc::clone(found),
            None => ctx
                .graph
                .sequence(&key)
                .ok_or_else(|| SchedulerError::reference("sequence", key.clone()))?,
        };

        let mut errors = Vec::new();
        let clock = HeadClock::local(
            beat,
            0.0,
            &child_data.events,
            ctx.config.exponential_floor,
            &mut errors,
        );
        for error in errors {
            ctx.report.error(error);
        }
        let clock = clock?;
        let mut head = Head::new(target.to_string(), false);
        head.start(&child_data, 0.0, time)?;

        let start = ctx.pool.acquire();
        let command = ctx.pool.get_mut(start);
        command.fill(beat, EventKind::Sequence, id, 0.0);
        command.time = time;
        command.duration = duration;
        ctx.report.dispatched += 1;
        self.pair_stop(start, beat + duration, id, ctx);

        debug!(sequence = %key, node = %head.target, beat, time, "child sequence started");
        self.children.push(Child {
            id: key,
            start,
            data: child_data,
            clock,
            head,
        });
        Ok(())
    }

    /// Dispatch carried stops whose beat is before `end`.
    fn dispatch_due_stops(&mut self, end: f64, map: &BeatMap<'_>, ctx: &mut FrameContext<'_>) {
        if self.stops.is_empty() {
            return;
        }
        let pool = &*ctx.pool;
        self.stops
            .sort_unstable_by(|a, b| pool.get(*a).beat.total_cmp(&pool.get(*b).beat));
        let n = self.stops.partition_point(|id| pool.get(*id).beat < end);
        self.due.extend(self.stops.drain(..n));

        let due = mem::take(&mut self.due);
        for &id in &due {
            let beat = ctx.pool.get(id).beat;
            match Self::time_at(beat, map, ctx) {
                Ok(time) => self.dispatch_stop(id, beat, time, ctx),
                Err(error) => {
                    ctx.report.error(error);
                    self.dispatch_stop(id, beat, self.last_time, ctx);
                }
            }
        }
        self.due = due;
        self.due.clear();
    }

    /// Send a stop command at `time` (never before its start), then
    /// release both halves of the pair.
    fn dispatch_stop(&mut self, id: CommandId, beat: f64, time: f64, ctx: &mut FrameContext<'_>) {
        let pair = ctx.pool.get(id).pair;
        let time = pair.map_or(time, |start| time.max(ctx.pool.get(start).time));
        let command = ctx.pool.get_mut(id);
        command.time = time;

        let result = match command.kind {
            EventKind::SequenceOff => {
                self.stop_child(pair, beat, time);
                Ok(())
            }
            _ => distribute(&mut *ctx.graph, &self.target, command),
        };
        match result {
            Ok(()) => ctx.report.dispatched += 1,
            Err(error) => ctx.report.error(error),
        }

        ctx.pool.release(id);
        if let Some(start) = pair {
            ctx.pool.release(start);
        }
    }

    fn stop_child(&mut self, start: Option<CommandId>, beat: f64, time: f64) {
        let Some(child) = self.children.iter_mut().find(|c| Some(c.start) == start) else {
            return;
        };
        if child.head.status != HeadStatus::Running {
            return;
        }
        let local = child.clock.from_parent(beat).unwrap_or(child.head.last_beat);
        // Running heads always accept a stop.
        let _ = child.head.request_stop(time, local);
    }

    fn process_children(
        &mut self,
        frame: &Frame,
        end: f64,
        map: &BeatMap<'_>,
        ctx: &mut FrameContext<'_>,
    ) {
        if self.children.is_empty() {
            return;
        }
        let mut children = mem::take(&mut self.children);
        for child in &mut children {
            let Child {
                data, clock, head, ..
            } = child;
            let b2 = match clock.from_parent(end) {
                Ok(beat) => beat,
                Err(error) => {
                    ctx.report.error(error);
                    continue;
                }
            };
            let child_frame = Frame {
                t1: frame.t1,
                t2: frame.t2,
                b1: head.last_beat,
                b2,
                start_time: head.start_time,
            };
            let child_map = |beat: f64| clock.to_parent(beat).and_then(map);
            head.process(data, &child_frame, &child_map, ctx);
        }
        children.retain(|c| c.head.status != HeadStatus::Idle);
        self.children = children;
    }

    /// Dispatch every remaining stop at `time` and go idle.
    pub fn flush(&mut self, time: f64, ctx: &mut FrameContext<'_>) {
        let stops = mem::take(&mut self.stops);
        for &id in &stops {
            let beat = ctx.pool.get(id).beat;
            self.dispatch_stop(id, beat, time, ctx);
        }
        self.stops = stops;
        self.stops.clear();

        for child in &mut self.children {
            if child.head.status != HeadStatus::Idle {
                child.head.flush(time, ctx);
            }
        }
        self.children.clear();
        self.buffer.clear();
        self.precued.clear();
        self.stop = None;
        self.status = HeadStatus::Idle;
        debug!(node = %self.target, time, "sequence drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Transport;
    use crate::config::SchedulerConfig;
    use crate::event::Event;
    use crate::sequencer::{CommandPool, TickReport};
    use crate::target::{Call, MemoryGraph};

    struct Rig {
        transport: Transport,
        pool: CommandPool,
        graph: MemoryGraph,
        config: SchedulerConfig,
        report: TickReport,
    }

    impl Rig {
        fn new() -> Self {
            let config = SchedulerConfig::default();
            let mut transport = Transport::new(&config);
            transport.start(0.0, None).unwrap();
            let mut graph = MemoryGraph::new();
            graph.add_node("synth", &["gain", "cutoff"]);
            Self {
                transport,
                pool: CommandPool::new(),
                graph,
                config,
                report: TickReport::default(),
            }
        }

        /// Run a frame covering `[head.last_beat, b2)` at the default 2 beats/s.
        fn frame(&mut self, head: &mut Head, data: &SequenceData, b2: f64) {
            let frame = Frame {
                t1: head.last_time(),
                t2: b2 / 2.0,
                b1: head.last_beat(),
                b2,
                start_time: head.start_time(),
            };
            let mut ctx = FrameContext {
                transport: &mut self.transport,
                pool: &mut self.pool,
                graph: &mut self.graph,
                config: &self.config,
                report: &mut self.report,
            };
            head.process(data, &frame, &|beat: f64| -> Result<f64> { Ok(beat) }, &mut ctx);
        }
    }

    fn started(data: &SequenceData) -> Head {
        let mut head = Head::new("synth", true);
        head.start(data, 0.0, 0.0).unwrap();
        head
    }

    #[test]
    fn note_is_split_into_start_and_stop() {
        let mut rig = Rig::new();
        let data = SequenceData::new("song").with_events([Event::note(0.0, 60, 0.8, 0.2)]);
        let mut head = started(&data);

        rig.frame(&mut head, &data, 0.1);
        let calls = rig.graph.take_calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], Call::Start { .. }));
        assert_eq!(head.pending_stops(), 1);

        rig.frame(&mut head, &data, 0.3);
        let calls = rig.graph.take_calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], Call::Stop { voice: Some(_), .. }));
        assert!((calls[0].time() - 0.1).abs() < 1e-12);
        assert_eq!(rig.pool.outstanding(), 0);
    }

    #[test]
    fn same_frame_note_stops_after_start() {
        let mut rig = Rig::new();
        let data = SequenceData::new("song").with_events([Event::note(0.0, 60, 1.0, 0.25)]);
        let mut head = started(&data);
        rig.frame(&mut head, &data, 1.0);
        let calls = rig.graph.calls();
        assert!(matches!(calls[0], Call::Start { .. }));
        assert!(matches!(calls[1], Call::Stop { .. }));
        assert_eq!(rig.pool.outstanding(), 0);
    }

    #[test]
    fn carried_stops_precede_new_starts() {
        let mut rig = Rig::new();
        let data = SequenceData::new("song").with_events([
            Event::note(0.0, 60, 1.0, 1.0),
            Event::note(1.0, 60, 1.0, 1.0),
        ]);
        let mut head = started(&data);
        rig.frame(&mut head, &data, 0.5);
        rig.graph.take_calls();
        rig.frame(&mut head, &data, 1.5);
        let calls = rig.graph.calls();
        assert!(matches!(calls[0], Call::Stop { .. }));
        assert!(matches!(calls[1], Call::Start { .. }));
    }

    #[test]
    fn params_collapse_to_last_write() {
        let mut rig = Rig::new();
        let data = SequenceData::new("song").with_events([
            Event::param(0.0, "gain", 0.1, Curve::Step),
            Event::param(0.2, "gain", 0.5, Curve::Step),
            Event::param(0.3, "cutoff", 200.0, Curve::Step),
        ]);
        let mut head = started(&data);
        rig.frame(&mut head, &data, 1.0);
        let calls = rig.graph.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], Call::Automate { param, value, .. } if param == "gain" && *value == 0.5));
        assert!(matches!(&calls[1], Call::Automate { param, .. } if param == "cutoff"));
    }

    #[test]
    fn exponential_param_is_precued_once() {
        let mut rig = Rig::new();
        let data = SequenceData::new("song").with_events([
            Event::param(0.0, "cutoff", 100.0, Curve::Step),
            Event::param(2.0, "cutoff", 800.0, Curve::Exponential),
        ]);
        let mut head = started(&data);
        rig.frame(&mut head, &data, 1.0);
        assert_eq!(rig.graph.take_calls().len(), 2);
        rig.frame(&mut head, &data, 3.0);
        assert!(rig.graph.take_calls().is_empty());
    }

    #[test]
    fn malformed_event_is_reported_and_skipped() {
        let mut rig = Rig::new();
        let data = SequenceData::new("song").with_events([
            Event::new(0.0, EventKind::Note, vec![60.into()]),
            Event::note(0.5, 62, 1.0, 0.1),
        ]);
        let mut head = started(&data);
        rig.frame(&mut head, &data, 1.0);
        assert_eq!(rig.report.errors.len(), 1);
        assert_eq!(rig.graph.calls().len(), 2);
    }

    #[test]
    fn stop_flushes_carried_stops_at_stop_time() {
        let mut rig = Rig::new();
        let data = SequenceData::new("song").with_events([Event::note(0.0, 60, 1.0, 8.0)]);
        let mut head = started(&data);
        rig.frame(&mut head, &data, 0.5);
        head.request_stop(1.0, 2.0).unwrap();
        assert_eq!(head.status(), HeadStatus::Draining);
        rig.frame(&mut head, &data, 2.5);
        assert_eq!(head.status(), HeadStatus::Idle);
        let calls = rig.graph.calls();
        assert!(matches!(calls[1], Call::Stop { time, .. } if time == 1.0));
        assert_eq!(rig.pool.outstanding(), 0);
    }

    #[test]
    fn window_end_and_stop_beat_are_exclusive() {
        let mut rig = Rig::new();
        let data = SequenceData::new("song").with_events([
            Event::note(1.0, 60, 1.0, 0.25),
            Event::note(1.5, 62, 1.0, 0.25),
        ]);
        let mut head = started(&data);
        rig.frame(&mut head, &data, 1.0);
        assert!(rig.graph.take_calls().is_empty());

        head.request_stop(0.75, 1.5).unwrap();
        rig.frame(&mut head, &data, 2.0);
        let calls = rig.graph.take_calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::Start { time, .. } if time == 0.5));
        assert!(matches!(calls[1], Call::Stop { .. }));
        assert_eq!(head.status(), HeadStatus::Idle);
    }

    #[test]
    fn start_while_draining_is_state_error() {
        let data = SequenceData::new("song");
        let mut head = started(&data);
        head.request_stop(1.0, 2.0).unwrap();
        assert!(matches!(
            head.start(&data, 0.0, 2.0),
            Err(SchedulerError::State(_))
        ));
        let mut idle = Head::new("synth", false);
        assert!(idle.request_stop(0.0, 0.0).is_err());
    }

    #[test]
    fn nested_sequence_plays_on_its_own_axis() {
        let mut rig = Rig::new();
        let verse = SequenceData::new("verse").with_events([Event::note(1.0, 64, 1.0, 0.5)]);
        let data = SequenceData::new("song")
            .with_events([Event::sequence(2.0, "verse", "synth", 4.0)])
            .with_sequence(verse);
        let mut head = started(&data);

        rig.frame(&mut head, &data, 2.5);
        assert!(rig.graph.take_calls().is_empty());
        rig.frame(&mut head, &data, 4.0);
        let calls = rig.graph.take_calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::Start { time, .. } if (time - 1.5).abs() < 1e-9));

        rig.frame(&mut head, &data, 7.0);
        assert_eq!(head.pending_stops(), 0);
        assert_eq!(rig.pool.outstanding(), 0);
    }

    #[test]
    fn unknown_sequence_is_reference_error() {
        let mut rig = Rig::new();
        let data =
            SequenceData::new("song").with_events([Event::sequence(0.0, "bridge", "synth", 4.0)]);
        let mut head = started(&data);
        rig.frame(&mut head, &data, 1.0);
        assert!(matches!(
            rig.report.errors[0],
            SchedulerError::Reference { kind: "sequence", .. }
        ));
        assert_eq!(rig.pool.outstanding(), 0);
    }

    #[test]
    fn insert_before_cursor_keeps_position() {
        let mut data = SequenceData::new("song").with_events([
            Event::note(0.0, 60, 1.0, 0.1),
            Event::note(2.0, 62, 1.0, 0.1),
        ]);
        let mut rig = Rig::new();
        let mut head = started(&data);
        rig.frame(&mut head, &data, 1.0);
        let index = data.insert(Event::note(0.5, 61, 1.0, 0.1));
        head.on_insert(index, 0.5);
        rig.graph.take_calls();
        rig.frame(&mut head, &data, 3.0);
        let calls = rig.graph.calls();
        assert!(matches!(&calls[0], Call::Start { name, .. } if *name == Arg::from(62)));
    }
}
