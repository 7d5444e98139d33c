//! Wall-clock timing for engine rounds.

use std::time::{Duration, Instant};

/// Measures elapsed wall time for a labelled activity.
pub struct Stopwatch {
    label: &'static str,
    start: Instant,
}

impl Stopwatch {
    /// Create and start a new stopwatch with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_s(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Time left before `budget` runs out, `None` once it is spent.
    pub fn remaining(&self, budget: Duration) -> Option<Duration> {
        budget.checked_sub(self.elapsed()).filter(|d| !d.is_zero())
    }

    /// Stop and log the elapsed time at debug level.
    pub fn finish(self) -> f64 {
        let elapsed = self.elapsed_s();
        tracing::debug!(label = self.label, elapsed_s = elapsed, "timing");
        elapsed
    }
}
