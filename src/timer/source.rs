//! Tick sources — the shared periodic wake-up behind the lookahead timer.
//!
//! A source only signals that a period has elapsed; it carries no payload.
//! [`ThreadTicker`] keeps ticks jitter-free by sleeping on a dedicated thread
//! and posting into a lock-free ring buffer that the scheduling thread drains.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use tracing::{debug, trace};

/// Pending ticks beyond this are dropped; the timer coalesces them anyway.
const TICK_QUEUE_CAPACITY: usize = 16;

/// A periodic tick generator.
pub trait TickSource {
    /// Begin ticking every `period`. The first tick is immediate.
    fn start(&mut self, period: Duration) -> io::Result<()>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Number of ticks posted since the last call.
    fn take_ticks(&mut self) -> usize;
}

/// Ticks from a background thread.
pub struct ThreadTicker {
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    ticks: Option<HeapCons<u64>>,
}

impl ThreadTicker {
    pub fn new() -> Self {
        Self {
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: None,
            ticks: None,
        }
    }
}

impl Default for ThreadTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for ThreadTicker {
    fn start(&mut self, period: Duration) -> io::Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        let (mut producer, consumer) = HeapRb::<u64>::new(TICK_QUEUE_CAPACITY).split();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let thread = thread::Builder::new()
            .name("beatline-ticker".into())
            .spawn(move || {
                let mut count = 0u64;
                while !stop_clone.load(Ordering::Relaxed) {
                    if producer.try_push(count).is_err() {
                        trace!(count, "tick queue full, dropping tick");
                    }
                    count += 1;
                    thread::sleep(period);
                }
            })?;

        debug!(period_ms = period.as_millis() as u64, "ticker started");
        self.stop_flag = stop_flag;
        self.thread = Some(thread);
        self.ticks = Some(consumer);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            debug!("ticker stopped");
        }
        self.ticks = None;
    }

    fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    fn take_ticks(&mut self) -> usize {
        let Some(ticks) = self.ticks.as_mut() else {
            return 0;
        };
        let mut n = 0;
        while ticks.try_pop().is_some() {
            n += 1;
        }
        n
    }
}

impl Drop for ThreadTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A tick source driven by hand, for deterministic playback.
#[derive(Debug, Default)]
pub struct ManualTicker {
    running: bool,
    pending: usize,
    starts: usize,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post one tick if running.
    pub fn tick(&mut self) {
        if self.running {
            self.pending += 1;
        }
    }

    /// How many times the source has been started.
    pub fn starts(&self) -> usize {
        self.starts
    }
}

impl TickSource for ManualTicker {
    fn start(&mut self, _period: Duration) -> io::Result<()> {
        if !self.running {
            self.running = true;
            self.starts += 1;
            self.pending += 1;
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        self.pending = 0;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn take_ticks(&mut self) -> usize {
        std::mem::take(&mut self.pending)
    }
}
