//! Integration tests for sequence playback.
//!
//! Drives the full path: events → Scheduler frames → MemoryGraph calls,
//! with a manual clock and tick source so every frame is deterministic.

use beatline::automation::Curve;
use beatline::target::Call;
use beatline::{
    Clock, Event, EventKind, HeadStatus, ManualClock, ManualTicker, MemoryGraph, Scheduler,
    SchedulerConfig, SchedulerError, SequenceData, SequenceId,
};

type TestScheduler = Scheduler<ManualClock, ManualTicker>;

fn setup(data: SequenceData) -> (TestScheduler, ManualClock, MemoryGraph) {
    let clock = ManualClock::new(0.0);
    let mut scheduler = Scheduler::new(clock.clone(), ManualTicker::new(), SchedulerConfig::default());
    scheduler.load_root(data, "synth").unwrap();
    let mut graph = MemoryGraph::new();
    graph.add_node("synth", &["gain", "cutoff"]);
    (scheduler, clock, graph)
}

/// Advance the clock in tick-sized steps, running one frame per step.
fn play_until(scheduler: &mut TestScheduler, clock: &ManualClock, graph: &mut MemoryGraph, until: f64) {
    let step = scheduler.config().tick_duration;
    while clock.now() < until {
        scheduler.run_frame(graph);
        clock.advance(step);
    }
}

fn starts(calls: &[Call]) -> usize {
    calls.iter().filter(|c| matches!(c, Call::Start { .. })).count()
}

fn stops(calls: &[Call]) -> usize {
    calls.iter().filter(|c| matches!(c, Call::Stop { .. })).count()
}

#[test]
fn note_duration_split_across_frames() {
    let data = SequenceData::new("song").with_events([Event::note(0.0, 60, 0.8, 0.2)]);
    let mut config = SchedulerConfig::default();
    // One frame covers [0, 0.1) beats at 2 beats/s.
    config.tick_duration = 0.03;
    config.lookahead = 0.02;
    let clock = ManualClock::new(0.0);
    let mut scheduler = Scheduler::new(clock.clone(), ManualTicker::new(), config);
    scheduler.load_root(data, "synth").unwrap();
    let mut graph = MemoryGraph::new();
    graph.add_node("synth", &[]);

    scheduler.start(Some(0.0), None).unwrap();
    scheduler.run_frame(&mut graph);
    let first = graph.take_calls();
    assert_eq!(starts(&first), 1);
    assert_eq!(stops(&first), 0);

    let mut rest = Vec::new();
    for _ in 0..4 {
        clock.advance(0.05);
        scheduler.run_frame(&mut graph);
        rest.extend(graph.take_calls());
    }
    assert_eq!(starts(&rest), 0);
    assert_eq!(stops(&rest), 1);
    let (Call::Start { voice, .. }, Call::Stop { voice: stopped, time, .. }) = (&first[0], &rest[0]) else {
        panic!("expected a start then a stop");
    };
    assert_eq!(Some(*voice), *stopped);
    assert!((time - 0.1).abs() < 1e-9);
}

#[test]
fn pool_is_conserved_across_cycles() {
    let data = SequenceData::new("song").with_events(
        (0..16).map(|i| Event::note(i as f64 * 0.5, 60 + i, 1.0, 0.75)),
    );
    let (mut scheduler, clock, mut graph) = setup(data);

    for cycle in 0..3 {
        scheduler.start(None, Some(0.0)).unwrap();
        play_until(&mut scheduler, &clock, &mut graph, clock.now() + 2.0);
        scheduler.stop(None).unwrap();
        play_until(&mut scheduler, &clock, &mut graph, clock.now() + 0.5);
        assert!(scheduler.is_idle(), "cycle {cycle} did not drain");
        assert_eq!(scheduler.pending_stops(), 0);
        assert_eq!(scheduler.pool().outstanding(), 0);
        assert_eq!(scheduler.pool().free(), scheduler.pool().created());
    }
    let calls = graph.calls();
    assert_eq!(starts(&calls), stops(&calls));
    assert_eq!(graph.playing("synth"), 0);
}

#[test]
fn distribution_is_beat_ascending() {
    let data = SequenceData::new("song").with_events(
        (0..12).map(|i| Event::note(i as f64 * 0.25, 60, 1.0, 0.1)),
    );
    let (mut scheduler, clock, mut graph) = setup(data);
    scheduler.start(Some(0.0), None).unwrap();
    play_until(&mut scheduler, &clock, &mut graph, 3.0);

    let times: Vec<f64> = graph
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Start { .. }))
        .map(Call::time)
        .collect();
    assert_eq!(times.len(), 12);
    assert!(times.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn nested_sequences_follow_parent_tempo() {
    let inner = SequenceData::new("inner").with_events([Event::note(0.5, 72, 1.0, 0.25)]);
    let verse = SequenceData::new("verse")
        .with_events([
            Event::note(0.0, 64, 1.0, 0.5),
            Event::sequence(1.0, "inner", "synth", 1.0),
        ])
        .with_sequence(inner);
    let data = SequenceData::new("song")
        .with_events([
            Event::rate(0.0, 4.0, Curve::Step),
            Event::sequence(2.0, "verse", "synth", 4.0),
        ])
        .with_sequence(verse);
    let (mut scheduler, clock, mut graph) = setup(data);
    scheduler.start(Some(0.0), None).unwrap();
    play_until(&mut scheduler, &clock, &mut graph, 3.0);

    let calls = graph.calls();
    let start_times: Vec<f64> = calls
        .iter()
        .filter(|c| matches!(c, Call::Start { .. }))
        .map(Call::time)
        .collect();
    // 4 beats/s: verse at beat 2 (0.5s), inner note at beat 3.5 (0.875s).
    assert_eq!(start_times.len(), 2);
    assert!((start_times[0] - 0.5).abs() < 1e-9);
    assert!((start_times[1] - 0.875).abs() < 1e-9);
    assert_eq!(stops(&calls), 2);
    assert_eq!(scheduler.pool().outstanding(), 0);
}

#[test]
fn sequence_resolved_through_graph() {
    let data = SequenceData::new("song").with_events([Event::sequence(0.0, "fill", "synth", 2.0)]);
    let (mut scheduler, clock, mut graph) = setup(data);
    graph.add_sequence(SequenceData::new("fill").with_events([Event::note(0.0, 36, 1.0, 0.5)]));
    scheduler.start(Some(0.0), None).unwrap();
    play_until(&mut scheduler, &clock, &mut graph, 1.0);
    assert_eq!(starts(&graph.calls()), 1);
}

#[test]
fn param_writes_collapse_and_exponential_is_precued() {
    let data = SequenceData::new("song").with_events([
        Event::param(0.0, "gain", 0.2, Curve::Step),
        Event::param(0.1, "gain", 0.4, Curve::Step),
        Event::param(0.2, "gain", 0.6, Curve::Step),
        Event::param(4.0, "gain", 1.0, Curve::Exponential),
    ]);
    let (mut scheduler, _clock, mut graph) = setup(data);
    scheduler.start(Some(0.0), None).unwrap();
    scheduler.run_frame(&mut graph);

    let calls = graph.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], Call::Automate { value, .. } if value == 0.6));
    assert!(matches!(
        calls[1],
        Call::Automate { curve: Curve::Exponential, time, .. } if (time - 2.0).abs() < 1e-9
    ));
    let mid = graph.param_value("synth", "gain", 1.0).unwrap();
    assert!(mid > 0.6 && mid < 1.0);
}

#[test]
fn bad_events_do_not_stall_the_frame() {
    let data = SequenceData::new("song").with_events([
        Event::new(0.0, EventKind::Note, vec![60.into(), "loud".into(), 1.into()]),
        Event::param(0.05, "drive", 1.0, Curve::Step),
        Event::sequence(0.1, "missing", "synth", 1.0),
        Event::note(0.2, 62, 1.0, 0.1),
    ]);
    let (mut scheduler, _clock, mut graph) = setup(data);
    scheduler.start(Some(0.0), None).unwrap();
    let report = scheduler.run_frame(&mut graph);

    assert_eq!(report.errors.len(), 3);
    assert!(matches!(report.errors[0], SchedulerError::MalformedEvent { .. }));
    assert!(matches!(report.errors[1], SchedulerError::Reference { kind: "param", .. }));
    assert!(matches!(report.errors[2], SchedulerError::Reference { kind: "sequence", .. }));
    assert_eq!(starts(&graph.calls()), 1);
}

#[test]
fn meter_events_reach_meter_aware_targets() {
    let data = SequenceData::new("song").with_events([
        Event::meter(0.0, 3, 1),
        Event::meter(6.0, 5, 1),
    ]);
    let (mut scheduler, clock, mut graph) = setup(data);
    scheduler.start(Some(0.0), None).unwrap();
    assert_eq!(scheduler.bar_at_beat(11.0).unwrap(), 3.0);
    play_until(&mut scheduler, &clock, &mut graph, 4.0);

    let meters: Vec<(f64, u32)> = graph
        .calls()
        .iter()
        .filter_map(|c| match c {
            Call::Meter { time, bar, .. } => Some((*time, *bar)),
            _ => None,
        })
        .collect();
    assert_eq!(meters, vec![(0.0, 3), (3.0, 5)]);
    assert_eq!(scheduler.beat_at_bar(4.0).unwrap(), 16.0);
}

#[test]
fn tempo_ramp_is_replayed_on_restart() {
    let data = SequenceData::new("song").with_events([
        Event::rate(0.0, 2.0, Curve::Step),
        Event::rate(4.0, 4.0, Curve::Linear),
        Event::note(6.0, 60, 1.0, 0.5),
    ]);
    let (mut scheduler, clock, mut graph) = setup(data);

    let mut note_offsets = Vec::new();
    for _ in 0..2 {
        let start = clock.now();
        scheduler.start(Some(start), Some(0.0)).unwrap();
        play_until(&mut scheduler, &clock, &mut graph, start + 4.0);
        let calls = graph.take_calls();
        let note = calls
            .iter()
            .find(|c| matches!(c, Call::Start { .. }))
            .map(Call::time)
            .unwrap();
        note_offsets.push(note - start);
        scheduler.stop(None).unwrap();
        play_until(&mut scheduler, &clock, &mut graph, clock.now() + 0.5);
        graph.take_calls();
    }
    // 4 beats over a 2→4 ramp take 4/3s, then 2 beats at 4 take 0.5s.
    assert!((note_offsets[0] - (4.0 / 3.0 + 0.5)).abs() < 1e-9);
    assert!((note_offsets[0] - note_offsets[1]).abs() < 1e-9);
}

#[test]
fn tempo_history_stays_bounded_across_cycles() {
    let data = SequenceData::new("song").with_events([
        Event::rate(0.0, 2.0, Curve::Step),
        Event::rate(4.0, 4.0, Curve::Linear),
    ]);
    let (mut scheduler, clock, mut graph) = setup(data);

    for cycle in 0..50 {
        let start = clock.now();
        scheduler.start(Some(start), Some(0.0)).unwrap();
        play_until(&mut scheduler, &clock, &mut graph, start + 2.0);
        let offset = scheduler.time_at_beat(6.0).unwrap() - start;
        assert!((offset - (4.0 / 3.0 + 0.5)).abs() < 1e-9, "cycle {cycle}: {offset}");
        scheduler.stop(None).unwrap();
        play_until(&mut scheduler, &clock, &mut graph, clock.now() + 0.5);
        let points = scheduler.transport().rate().events().len();
        assert!(points <= 4, "cycle {cycle}: {points} rate points");
    }
}

#[test]
fn stopping_mid_sequence_drains_child_stops() {
    let verse = SequenceData::new("verse").with_events([Event::note(0.0, 64, 1.0, 8.0)]);
    let data = SequenceData::new("song")
        .with_events([Event::sequence(0.0, "verse", "synth", 16.0)])
        .with_sequence(verse);
    let (mut scheduler, clock, mut graph) = setup(data);
    scheduler.start(Some(0.0), None).unwrap();
    play_until(&mut scheduler, &clock, &mut graph, 1.0);
    assert_eq!(scheduler.pending_stops(), 2);

    let stop_time = clock.now();
    scheduler.stop(Some(stop_time)).unwrap();
    assert_eq!(scheduler.status(SequenceId::ROOT), Some(HeadStatus::Draining));
    play_until(&mut scheduler, &clock, &mut graph, stop_time + 0.5);

    assert!(scheduler.is_idle());
    assert_eq!(scheduler.pool().outstanding(), 0);
    let calls = graph.calls();
    assert!(matches!(calls.last(), Some(Call::Stop { time, .. }) if *time == stop_time));
}

#[test]
fn explicit_sequence_off_stops_child_early() {
    let verse = SequenceData::new("verse")
        .with_events((0..8).map(|i| Event::note(i as f64, 60, 1.0, 0.5)));
    let data = SequenceData::new("song")
        .with_events([
            Event::sequence(0.0, "verse", "synth", 8.0),
            Event::new(2.0, EventKind::SequenceOff, vec!["verse".into()]),
        ])
        .with_sequence(verse);
    let (mut scheduler, clock, mut graph) = setup(data);
    scheduler.start(Some(0.0), None).unwrap();
    play_until(&mut scheduler, &clock, &mut graph, 5.0);

    let calls = graph.calls();
    assert_eq!(starts(&calls), 2);
    assert_eq!(stops(&calls), 2);
    assert_eq!(scheduler.pool().outstanding(), 0);
}

#[test]
fn recorded_events_play_on_next_cycle() {
    let (mut scheduler, clock, mut graph) = setup(SequenceData::new("song"));
    scheduler.start(Some(0.0), None).unwrap();
    scheduler
        .record(SequenceId::ROOT, 0.5, EventKind::NoteOn, vec!["c4".into(), 1.0.into()])
        .unwrap();
    scheduler
        .record(SequenceId::ROOT, 0.75, EventKind::NoteOff, vec!["c4".into()])
        .unwrap();
    scheduler.stop(Some(1.0)).unwrap();
    play_until(&mut scheduler, &clock, &mut graph, 1.5);
    graph.take_calls();

    let start = clock.now();
    scheduler.start(Some(start), Some(0.0)).unwrap();
    play_until(&mut scheduler, &clock, &mut graph, start + 1.0);
    let calls = graph.calls();
    assert_eq!(starts(&calls), 1);
    assert_eq!(stops(&calls), 1);
    assert!((calls[0].time() - start - 0.5).abs() < 1e-9);
}

#[test]
fn top_level_sequence_runs_on_local_clock() {
    let (mut scheduler, clock, mut graph) = setup(SequenceData::new("song"));
    let id = scheduler.add_sequence(
        SequenceData::new("half").with_events([
            Event::rate(0.0, 0.5, Curve::Step),
            Event::note(1.0, 48, 1.0, 1.0),
        ]),
        "synth",
    );
    clock.set(2.0);
    scheduler.start_sequence(id, None, 0.0).unwrap();
    play_until(&mut scheduler, &clock, &mut graph, 5.0);

    // Local beat 1 at half rate is 2 transport beats, 1s at 2 beats/s.
    let calls = graph.calls();
    assert!((calls[0].time() - 3.0).abs() < 1e-9);
    assert!((calls[1].time() - 4.0).abs() < 1e-9);
    assert_eq!(scheduler.status(id), Some(HeadStatus::Running));

    scheduler.stop_sequence(id, None).unwrap();
    play_until(&mut scheduler, &clock, &mut graph, clock.now() + 0.5);
    assert_eq!(scheduler.status(id), Some(HeadStatus::Idle));
}
