//! Rate limit configuration and per-reader pacing state.

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;

use tokio::time::Instant;

use crate::constants::SLICES_PER_SECOND;
use crate::error::{Error, Result};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Configured read-rate ceiling in bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimit(Option<NonZeroU64>);

impl RateLimit {
    /// No throttling.
    pub const UNLIMITED: RateLimit = RateLimit(None);

    /// Limit to `bytes_per_second`; zero means unlimited.
    pub fn bytes_per_second(bytes_per_second: u64) -> Self {
        Self(NonZeroU64::new(bytes_per_second))
    }

    /// Interpret a signed limit; zero or negative means unlimited.
    pub fn from_signed(limit: i64) -> Self {
        Self::bytes_per_second(u64::try_from(limit).unwrap_or(0))
    }

    /// The limit, or `None` when unlimited.
    pub fn get(&self) -> Option<NonZeroU64> {
        self.0
    }

    pub fn is_unlimited(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(limit) => write!(f, "{limit} B/s"),
            None => f.write_str("unlimited"),
        }
    }
}

impl FromStr for RateLimit {
    type Err = Error;

    /// Parse `1024`, `512K`, `2M` or `1G` (binary multiples, case-insensitive,
    /// optional trailing `B`). Zero or a negative number means unlimited.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidConfig {
            message: format!("invalid rate limit: {s:?}"),
        };

        let text = s.trim();
        let text = text.strip_suffix(['b', 'B']).unwrap_or(text);

        let (number, multiplier) = match text.char_indices().last() {
            Some((idx, c)) if c.is_ascii_alphabetic() => {
                let multiplier: u64 = match c.to_ascii_uppercase() {
                    'K' => 1 << 10,
                    'M' => 1 << 20,
                    'G' => 1 << 30,
                    _ => return Err(invalid()),
                };
                (&text[..idx], multiplier)
            }
            _ => (text, 1),
        };

        let value: i64 = number.parse().map_err(|_| invalid())?;
        if value <= 0 {
            return Ok(Self::UNLIMITED);
        }

        (value as u64)
            .checked_mul(multiplier)
            .map(Self::bytes_per_second)
            .ok_or_else(invalid)
    }
}

/// Pacing state for one throttled source.
///
/// Tracks when bytes were last handed to the caller and how many bytes have
/// been granted in total. Over any long interval, granted bytes divided by
/// elapsed time stays at or below the limit.
#[derive(Debug, Clone)]
pub struct RateBudget {
    limit: NonZeroU64,
    last_read: Option<Instant>,
    started_at: Option<Instant>,
    granted: u64,
}

impl RateBudget {
    pub fn new(limit: NonZeroU64) -> Self {
        Self {
            limit,
            last_read: None,
            started_at: None,
            granted: 0,
        }
    }

    pub fn limit(&self) -> NonZeroU64 {
        self.limit
    }

    /// Largest read allowed in one call: one slice of the per-second budget, at least one byte.
    pub fn slice_bytes(&self) -> usize {
        let slice = (self.limit.get() / SLICES_PER_SECOND).max(1);
        usize::try_from(slice).unwrap_or(usize::MAX)
    }

    /// Truncate a requested read length to one slice.
    pub fn grant(&self, requested: usize) -> usize {
        requested.min(self.slice_bytes())
    }

    /// Time `bytes` should take at the configured rate.
    pub fn expected_duration(&self, bytes: usize) -> Duration {
        let nanos = (bytes as u128) * NANOS_PER_SECOND / u128::from(self.limit.get());
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Start the clock on the first read.
    pub fn begin(&mut self, now: Instant) {
        self.last_read.get_or_insert(now);
        self.started_at.get_or_insert(now);
    }

    /// Account for `bytes` returned by the underlying source at `now`.
    ///
    /// Returns how long to wait before handing them out, if at all.
    pub fn settle(&mut self, bytes: usize, now: Instant) -> Option<Duration> {
        self.granted = self.granted.saturating_add(bytes as u64);

        let last = *self.last_read.get_or_insert(now);
        let elapsed = now.saturating_duration_since(last);
        let expected = self.expected_duration(bytes);

        (elapsed < expected).then(|| expected - elapsed)
    }

    /// Record that bytes were handed to the caller at `now`.
    pub fn mark(&mut self, now: Instant) {
        self.last_read = Some(now);
    }

    /// Total bytes granted so far.
    pub fn granted(&self) -> u64 {
        self.granted
    }

    /// Average granted rate since the first read, in bytes per second.
    pub fn average_rate(&self, now: Instant) -> Option<f64> {
        let started = self.started_at?;
        let secs = now.saturating_duration_since(started).as_secs_f64();
        (secs > 0.0).then(|| self.granted as f64 / secs)
    }
}
