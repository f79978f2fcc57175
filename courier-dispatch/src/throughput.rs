//! Rolling completion rate over the last few seconds.

use std::{collections::VecDeque, time::Duration};

use tokio::time::Instant;

const HORIZON: Duration = Duration::from_secs(5);

/// Tracks completions and derives a messages-per-second rate from the oldest
/// and newest samples inside [`HORIZON`]. Purely observational.
#[derive(Debug)]
pub struct ThroughputMonitor {
    samples: VecDeque<(Instant, u64)>,
    completed: u64,
    current: f64,
    peak: f64,
}

impl Default for ThroughputMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputMonitor {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            completed: 0,
            current: 0.0,
            peak: 0.0,
        }
    }

    /// Record one completion now and return the current rate.
    pub fn record_completion(&mut self) -> f64 {
        self.record_completion_at(Instant::now())
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_completion_at(&mut self, now: Instant) -> f64 {
        self.completed += 1;
        self.samples.push_back((now, self.completed));

        while let Some(&(at, _)) = self.samples.front() {
            if now.saturating_duration_since(at) > HORIZON {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        self.current = match (self.samples.front(), self.samples.back()) {
            (Some(&(first_at, first)), Some(&(last_at, last))) if self.samples.len() >= 2 => {
                let elapsed_ms = last_at.saturating_duration_since(first_at).as_millis();
                if elapsed_ms == 0 {
                    0.0
                } else {
                    (last - first) as f64 / elapsed_ms as f64 * 1000.0
                }
            }
            _ => 0.0,
        };

        self.peak = self.peak.max(self.current);
        self.current
    }

    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.completed
    }

    #[must_use]
    pub const fn current(&self) -> f64 {
        self.current
    }

    #[must_use]
    pub const fn peak(&self) -> f64 {
        self.peak
    }
}
