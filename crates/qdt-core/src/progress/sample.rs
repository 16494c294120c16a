use std::time::Duration;

use tokio::time::Instant;

/// One observation of the byte counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub at: Instant,
    pub bytes: u64,
}

impl ProgressSample {
    pub fn new(at: Instant, bytes: u64) -> Self {
        Self { at, bytes }
    }

    /// Derive the status between `previous` and this sample.
    ///
    /// Speed is zero when no time has passed. The counter never decreases, but
    /// a stale `previous` is tolerated by saturating.
    pub fn status_since(&self, previous: &ProgressSample, total: u64) -> ProgressStatus {
        let diff = self.bytes.saturating_sub(previous.bytes);
        let elapsed = self.at.saturating_duration_since(previous.at);
        ProgressStatus {
            bytes: self.bytes,
            total,
            speed: bytes_per_second(diff, elapsed),
        }
    }
}

/// Derived view of a transfer at one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressStatus {
    pub bytes: u64,
    pub total: u64,
    /// Bytes per second since the previous sample.
    pub speed: f64,
}

impl ProgressStatus {
    /// Completion percentage, clamped to `0.0..=100.0`. An empty transfer is
    /// complete by definition.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.bytes as f64 / self.total as f64 * 100.0).min(100.0)
    }

    pub fn is_complete(&self) -> bool {
        self.bytes >= self.total
    }
}

fn bytes_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { bytes as f64 / secs } else { 0.0 }
}
