//! Throttled progress notes from subprocess stderr.
//!
//! OCR tools write a line per page (or more); forwarding each one to the
//! durable progress sink would swamp it. The throttle keeps the full
//! transcript for failure detail but forwards at most one note per window,
//! so operators still get a heartbeat during long runs.

use crate::StderrSink;
use std::time::{Duration, Instant};

/// Source of monotonic time; injected so throttle behavior is testable
/// without sleeping.
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

/// Wall clock used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Default note window.
pub const NOTE_WINDOW: Duration = Duration::from_secs(5);

/// Accumulates every stderr line and forwards at most one progress note per
/// window. The first line of a run always fires a note.
pub struct ProgressThrottle<C: Clock = SystemClock> {
    lines: Vec<String>,
    last_note: Option<Instant>,
    window: Duration,
    clock: C,
    notify: Box<dyn FnMut(&str) + Send>,
}

impl ProgressThrottle<SystemClock> {
    pub fn new(notify: impl FnMut(&str) + Send + 'static) -> Self {
        Self::with_clock(SystemClock, NOTE_WINDOW, notify)
    }
}

impl<C: Clock> ProgressThrottle<C> {
    pub fn with_clock(clock: C, window: Duration, notify: impl FnMut(&str) + Send + 'static) -> Self {
        Self {
            lines: Vec::new(),
            last_note: None,
            window,
            clock,
            notify: Box::new(notify),
        }
    }

    /// Full transcript so far, newline-joined; included in failure detail.
    pub fn transcript(&self) -> String {
        self.lines.join("\n")
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

impl<C: Clock> StderrSink for ProgressThrottle<C> {
    fn line(&mut self, line: &str) {
        tracing::debug!(target: "omniextract::tool", "{line}");
        self.lines.push(line.to_string());

        let now = self.clock.now();
        let due = match self.last_note {
            None => true,
            Some(prev) => now.duration_since(prev) >= self.window,
        };
        if due {
            self.last_note = Some(now);
            (self.notify)(line);
        }
    }
}
