use std::time::Duration;

/// Tells the host when the next snapshot is due.
///
/// Elapsed time accumulates across calls; a long frame produces one due
/// snapshot, not a burst.
#[derive(Debug, Clone)]
pub struct SnapshotTimer {
    interval: Duration,
    accumulated: Duration,
}

impl SnapshotTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            accumulated: Duration::ZERO,
        }
    }

    /// Adds `elapsed` and returns true if a snapshot should go out now.
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        self.accumulated += elapsed;
        if self.accumulated < self.interval {
            return false;
        }
        self.accumulated -= self.interval;
        if self.accumulated >= self.interval {
            self.accumulated = Duration::ZERO;
        }
        true
    }

    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
