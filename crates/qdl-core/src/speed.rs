//! Sliding-window transfer-rate meter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Instantaneous speed as a sliding-window average of recent byte
/// deltas. Samples older than the window are dropped on every query.
#[derive(Debug)]
pub struct SpeedMeter {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl SpeedMeter {
    /// Default 5-second window.
    pub fn new() -> Self {
        SpeedMeter::with_window(Duration::from_secs(5))
    }

    pub fn with_window(window: Duration) -> Self {
        SpeedMeter {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Records `bytes` received now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    fn record_at(&mut self, at: Instant, bytes: u64) {
        self.samples.push_back((at, bytes));
        self.evict(at);
    }

    /// Average bytes per second over the window. Zero with no samples.
    pub fn bytes_per_sec(&mut self) -> f64 {
        let now = Instant::now();
        self.evict(now);
        let total: u64 = self.samples.iter().map(|(_, b)| b).sum();
        let span = match self.samples.front() {
            Some((oldest, _)) => now.duration_since(*oldest).as_secs_f64(),
            None => return 0.0,
        };
        // Use the full window once enough history exists so short bursts
        // don't read as sustained throughput.
        let denom = span.max(0.5).min(self.window.as_secs_f64());
        total as f64 / denom
    }

    /// Clears all samples (on pause or restart).
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    fn evict(&mut self, now: Instant) {
        while let Some((at, _)) = self.samples.front() {
            if now.duration_since(*at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for SpeedMeter {
    fn default() -> Self {
        SpeedMeter::new()
    }
}
