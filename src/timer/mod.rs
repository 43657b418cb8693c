//! Lookahead timer — wakes listeners ahead of real time, one batch per tick.
//!
//! Two levels: a single shared [`TickSource`] and any number of listeners.
//! Each listener queues requests; on every tick its queue is swapped out
//! before draining, so a request re-armed from inside a callback lands in
//! the *next* tick. Listeners with nothing queued go idle, and the source
//! stops once every listener is idle.

pub mod source;

pub use source::{ManualTicker, ThreadTicker, TickSource};

use std::io;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::SchedulerConfig;

/// Handle to a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

/// Handle to a queued request, for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

struct Listener<T> {
    requests: Vec<(RequestId, T)>,
    draining: Vec<(RequestId, T)>,
    current_time: f64,
    active: bool,
}

/// A shared tick source fanned out to listeners carrying payloads `T`.
pub struct LookaheadTimer<S: TickSource, T> {
    source: S,
    tick_duration: f64,
    lookahead: f64,
    listeners: Vec<Listener<T>>,
    active: usize,
    next_request: u64,
}

impl<S: TickSource, T> LookaheadTimer<S, T> {
    pub fn new(source: S, config: &SchedulerConfig) -> Self {
        Self {
            source,
            tick_duration: config.tick_duration,
            lookahead: config.lookahead,
            listeners: Vec::new(),
            active: 0,
            next_request: 0,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn add_listener(&mut self) -> ListenerId {
        self.listeners.push(Listener {
            requests: Vec::new(),
            draining: Vec::new(),
            current_time: 0.0,
            active: false,
        });
        ListenerId(self.listeners.len() - 1)
    }

    pub fn is_active(&self, listener: ListenerId) -> bool {
        self.listeners.get(listener.0).is_some_and(|l| l.active)
    }

    /// Number of listeners with queued requests.
    pub fn active_listeners(&self) -> usize {
        self.active
    }

    /// Time the listener's last batch was scheduled up to.
    pub fn current_time(&self, listener: ListenerId) -> f64 {
        self.listeners.get(listener.0).map_or(0.0, |l| l.current_time)
    }

    /// Queue `payload` for the listener's next tick, starting the source if
    /// idle. Nothing is queued when the source fails to start.
    pub fn request(&mut self, listener: ListenerId, payload: T) -> io::Result<RequestId> {
        if listener.0 >= self.listeners.len() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "unknown listener"));
        }
        if !self.source.is_running() {
            self.source
                .start(Duration::from_secs_f64(self.tick_duration))?;
            debug!("lookahead timer started");
        }

        let id = RequestId(self.next_request);
        self.next_request += 1;
        let slot = &mut self.listeners[listener.0];
        slot.requests.push((id, payload));
        if !slot.active {
            slot.active = true;
            self.active += 1;
        }
        Ok(id)
    }

    /// Remove a queued request. Returns its payload if it had not fired.
    pub fn cancel(&mut self, listener: ListenerId, request: RequestId) -> Option<T> {
        let slot = self.listeners.get_mut(listener.0)?;
        let index = slot.requests.iter().position(|(id, _)| *id == request)?;
        let (_, payload) = slot.requests.remove(index);
        if slot.requests.is_empty() && slot.active {
            slot.active = false;
            self.active -= 1;
            self.stop_if_idle();
        }
        Some(payload)
    }

    /// Drain pending ticks; fire one batch if any arrived. Returns the tick count.
    pub fn poll<F>(&mut self, now: f64, callback: F) -> usize
    where
        F: FnMut(ListenerId, T, f64) -> Option<T>,
    {
        let ticks = self.source.take_ticks();
        if ticks > 1 {
            warn!(ticks, "lookahead timer fell behind, coalescing ticks");
        }
        if ticks > 0 {
            self.fire(now, callback);
        }
        ticks
    }

    /// Run one tick: hand each queued payload to `callback` with the
    /// listener's lookahead time. A returned payload is re-queued for the
    /// next tick.
    pub fn fire<F>(&mut self, now: f64, mut callback: F)
    where
        F: FnMut(ListenerId, T, f64) -> Option<T>,
    {
        let horizon = now + self.tick_duration + self.lookahead;
        let next_request = &mut self.next_request;

        for (index, slot) in self.listeners.iter_mut().enumerate() {
            if !slot.active {
                continue;
            }
            slot.current_time = slot.current_time.max(horizon);
            std::mem::swap(&mut slot.requests, &mut slot.draining);

            let Listener {
                requests,
                draining,
                current_time,
                ..
            } = &mut *slot;
            for (_, payload) in draining.drain(..) {
                if let Some(next) = callback(ListenerId(index), payload, *current_time) {
                    requests.push((RequestId(*next_request), next));
                    *next_request += 1;
                }
            }

            if slot.requests.is_empty() {
                slot.active = false;
                self.active -= 1;
            }
        }

        self.stop_if_idle();
    }

    fn stop_if_idle(&mut self) {
        if self.active == 0 && self.source.is_running() {
            self.source.stop();
            debug!("lookahead timer idle, source stopped");
        }
    }
}
