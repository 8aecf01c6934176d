use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Named-interval instrumentation for the scoring hot path.
///
/// `start` is a no-op while the interval is already running and `finish` is a
/// no-op for an interval that was never started. Totals are reported through
/// `tracing` by [`Timer::report`], and once more when a timer that recorded
/// anything is dropped.
#[derive(Debug, Default)]
pub struct Timer {
    inner: Mutex<TimerState>,
}

#[derive(Debug, Default)]
struct TimerState {
    running: HashMap<String, Instant>,
    parts: HashMap<String, Vec<Duration>>,
}

/// Aggregate of all finished intervals recorded under one name.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSummary {
    pub name: String,
    pub total: Duration,
    pub count: usize,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, name: &str) {
        self.state()
            .running
            .entry(name.to_string())
            .or_insert_with(Instant::now);
    }

    pub fn finish(&self, name: &str) {
        let mut state = self.state();
        if let Some(started) = state.running.remove(name) {
            state
                .parts
                .entry(name.to_string())
                .or_default()
                .push(started.elapsed());
        }
    }

    /// Starts `name` and finishes it when the returned guard is dropped.
    pub fn scope<'a>(&'a self, name: &'a str) -> TimerScope<'a> {
        self.start(name);
        TimerScope { timer: self, name }
    }

    pub fn summary(&self) -> Vec<IntervalSummary> {
        let state = self.state();
        let mut summary: Vec<IntervalSummary> = state
            .parts
            .iter()
            .map(|(name, parts)| IntervalSummary {
                name: name.clone(),
                total: parts.iter().sum(),
                count: parts.len(),
            })
            .collect();
        summary.sort_by(|a, b| a.name.cmp(&b.name));
        summary
    }

    pub fn report(&self) {
        for entry in self.summary() {
            tracing::info!(
                name = %entry.name,
                total_ms = entry.total.as_secs_f64() * 1000.0,
                count = entry.count,
                "timer interval"
            );
        }
    }

    /// Clears finished intervals and any interval still running.
    pub fn reset(&self) {
        let mut state = self.state();
        state.running.clear();
        state.parts.clear();
    }

    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let recorded = !self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .parts
            .is_empty();
        if recorded {
            self.report();
        }
    }
}

pub struct TimerScope<'a> {
    timer: &'a Timer,
    name: &'a str,
}

impl Drop for TimerScope<'_> {
    fn drop(&mut self) {
        self.timer.finish(self.name);
    }
}
