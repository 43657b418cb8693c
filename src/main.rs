//! Beatline — plays a song file against the system clock.
//!
//! Loads a YAML song (or a built-in demo), schedules it through a
//! [`ThreadTicker`] and logs every command the in-memory graph receives.
//! Ctrl-C stops the transport; the process exits once pending stops drain.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use beatline::automation::Curve;
use beatline::target::Call;
use beatline::{
    Event, MemoryGraph, Scheduler, SchedulerConfig, SequenceData, SystemClock, ThreadTicker,
};

#[derive(Debug, Parser)]
#[command(name = "beatline", version, about = "Play a beatline song in real time")]
struct Args {
    /// Song file (YAML). Plays the built-in demo when omitted.
    song: Option<PathBuf>,

    /// Scheduler config file; defaults to ~/.beatline/scheduler.yaml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Starting tempo in beats per minute.
    #[arg(long)]
    tempo: Option<f64>,

    /// Seconds to play before stopping.
    #[arg(long, default_value_t = 8.0)]
    duration: f64,
}

/// A song file: root events, nested sequences and the node they play.
#[derive(Debug, Deserialize)]
struct Song {
    #[serde(default = "default_target")]
    target: String,
    #[serde(default)]
    params: Vec<String>,
    #[serde(default)]
    events: Vec<Event>,
    #[serde(default)]
    sequences: Vec<SequenceData>,
}

fn default_target() -> String {
    "synth".to_string()
}

impl Song {
    fn load(path: &Path) -> beatline::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// A bar of 3/4, a tempo ramp, a filter sweep and a nested riff.
    fn demo() -> Self {
        let riff = SequenceData::new("riff").with_events([
            Event::note(0.0, 67, 0.6, 0.25),
            Event::note(0.5, 69, 0.6, 0.25),
            Event::note(1.0, 71, 0.6, 0.5),
        ]);
        let mut events = vec![
            Event::meter(0.0, 3, 1),
            Event::rate(0.0, 2.0, Curve::Step),
            Event::rate(6.0, 3.0, Curve::Linear),
            Event::param(0.0, "cutoff", 200.0, Curve::Step),
            Event::param(6.0, "cutoff", 3200.0, Curve::Exponential),
            Event::sequence(3.0, "riff", "synth", 2.0),
        ];
        for beat in 0..12 {
            events.push(Event::note(beat as f64, 60 + (beat % 3) * 4, 0.8, 0.5));
        }
        Self {
            target: default_target(),
            params: vec!["cutoff".to_string(), "gain".to_string()],
            events,
            sequences: vec![riff],
        }
    }

    fn into_parts(self) -> (SequenceData, MemoryGraph, String) {
        let mut graph = MemoryGraph::new();
        let params: Vec<&str> = self.params.iter().map(String::as_str).collect();
        graph.add_node(&self.target, &params);

        let mut data = SequenceData::new("song").with_events(self.events);
        for sequence in self.sequences {
            data = data.with_sequence(sequence);
        }
        (data, graph, self.target)
    }
}

fn log_call(call: &Call) {
    match call {
        Call::Start {
            target,
            time,
            name,
            value,
            ..
        } => info!(target: "beatline::play", node = %target, time, %name, value, "start"),
        Call::Stop {
            target, time, name, ..
        } => info!(target: "beatline::play", node = %target, time, %name, "stop"),
        Call::Automate {
            target,
            param,
            time,
            curve,
            value,
            ..
        } => info!(target: "beatline::play", node = %target, %param, time, %curve, value, "automate"),
        Call::Meter {
            target,
            time,
            bar,
            subdivision,
        } => info!(target: "beatline::play", node = %target, time, bar, subdivision, "meter"),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("beatline=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match SchedulerConfig::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                error!("failed to load config {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => SchedulerConfig::load().unwrap_or_default(),
    };
    if let Some(bpm) = args.tempo {
        config.default_rate = bpm / 60.0;
    }
    if let Err(e) = config.validate() {
        error!("{e}");
        std::process::exit(1);
    }

    let song = match &args.song {
        Some(path) => match Song::load(path) {
            Ok(song) => song,
            Err(e) => {
                error!("failed to load song {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => Song::demo(),
    };
    let (data, mut graph, target) = song.into_parts();

    let stop_requested = Arc::new(AtomicBool::new(false));
    let flag = stop_requested.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!("could not install Ctrl-C handler: {e}");
    }

    let poll = Duration::from_secs_f64(config.tick_duration / 8.0);
    let mut scheduler = Scheduler::new(SystemClock::new(), ThreadTicker::new(), config);
    if let Err(e) = scheduler.load_root(data, &target) {
        error!("{e}");
        std::process::exit(1);
    }

    info!(
        "beatline v{} — playing for {:.1}s",
        env!("CARGO_PKG_VERSION"),
        args.duration
    );
    if let Err(e) = scheduler.start(None, Some(0.0)) {
        error!("failed to start: {e}");
        std::process::exit(1);
    }

    let mut stopping = false;
    loop {
        let report = scheduler.tick(&mut graph);
        for call in graph.take_calls() {
            log_call(&call);
        }
        if !report.errors.is_empty() {
            warn!(count = report.errors.len(), "events skipped this tick");
        }

        let now = scheduler.now();
        if !stopping && (stop_requested.load(Ordering::SeqCst) || now >= args.duration) {
            stopping = true;
            match scheduler.stop(Some(now)) {
                Ok(beat) => info!(
                    beat,
                    bar = scheduler.bar_at_beat(beat).unwrap_or(0.0),
                    "stopping"
                ),
                Err(e) => {
                    error!("failed to stop: {e}");
                    break;
                }
            }
        }
        if stopping && scheduler.is_idle() {
            break;
        }
        thread::sleep(poll);
    }

    let pool = scheduler.pool();
    info!(
        created = pool.created(),
        outstanding = pool.outstanding(),
        "done"
    );
}
