//! Blocking, filterable FIFO log of engine events.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use regex::Regex;

use crate::error::{Error, Result};
use crate::event::Event;

/// Unbounded FIFO of [`Event`]s with blocking retrieval.
///
/// Producers (the engine callback, from whatever thread the engine uses)
/// and consumers are serialized by the queue lock; delivery order is
/// exactly arrival order, never coalesced or reordered.
pub struct EventLog {
    label: String,
    debug: bool,
    default_timeout: Mutex<Option<Duration>>,
    queue: Mutex<VecDeque<Event>>,
    cond: Condvar,
}

impl EventLog {
    /// `label` tags the debug trace line; sessions derive one from their
    /// id when the caller does not supply one.
    pub fn new(label: impl Into<String>, debug: bool) -> Self {
        Self {
            label: label.into(),
            debug,
            default_timeout: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Default wait bound applied when `get` is called without an
    /// explicit timeout. `None` means wait forever.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        *self.default_timeout.lock() = timeout;
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Append one event. Never blocks, never fails.
    pub fn record(&self, event: Event) {
        if self.debug {
            let thread = std::thread::current();
            tracing::debug!("[{}-{}] {event}", thread.name().unwrap_or("?"), self.label);
        }
        self.queue.lock().push_back(event);
        self.cond.notify_one();
    }

    /// Block until an event is available or the wait bound elapses.
    ///
    /// The bound is `timeout`, falling back to the configured default;
    /// with neither, the call waits forever. An event already queued
    /// when the call starts is returned immediately, whatever the bound.
    /// With `check_error`, the engine's designated error event comes back
    /// as [`Error::Protocol`] instead of a value.
    pub fn get(&self, timeout: Option<Duration>, check_error: bool) -> Result<Event> {
        let timeout = timeout.or(*self.default_timeout.lock());
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut queue = self.queue.lock();
        loop {
            if let Some(event) = queue.pop_front() {
                drop(queue);
                if check_error && event.is_error() {
                    return Err(Error::Protocol {
                        name: event.name,
                        data1: event.data1,
                        data2: event.data2,
                    });
                }
                return Ok(event);
            }
            match deadline {
                None => self.cond.wait(&mut queue),
                Some(deadline) => {
                    if self.cond.wait_until(&mut queue, deadline).timed_out()
                        && queue.is_empty()
                    {
                        return Err(Error::Timeout);
                    }
                }
            }
        }
    }

    /// Block until an event whose name matches `pattern` (a
    /// prefix-anchored regular expression) arrives.
    ///
    /// Intervening non-matching events are consumed and discarded —
    /// callers that need those events must not use this method. The
    /// retry is unbounded: without a configured default timeout this
    /// blocks forever if no matching event ever arrives.
    pub fn get_matching(&self, pattern: &str) -> Result<Event> {
        let regex = Regex::new(&format!("^(?:{pattern})"))?;
        loop {
            let event = self.get(None, true)?;
            if regex.is_match(&event.name) {
                return Ok(event);
            }
        }
    }
}
