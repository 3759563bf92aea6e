//! Arrival timestamps: a monotonic instant for staleness arithmetic paired
//! with wall-clock time for the emitted record.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    monotonic: Instant,
    wall: DateTime<Utc>,
}

impl Timestamp {
    pub fn now() -> Self {
        Self {
            monotonic: Instant::now(),
            wall: Utc::now(),
        }
    }

    pub fn from_parts(monotonic: Instant, wall: DateTime<Utc>) -> Self {
        Self { monotonic, wall }
    }

    /// The same moment shifted forward on both clocks.
    pub fn advanced_by(&self, duration: Duration) -> Self {
        let wall = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| self.wall.checked_add_signed(d))
            .unwrap_or(self.wall);
        Self {
            monotonic: self.monotonic + duration,
            wall,
        }
    }

    /// Monotonic time elapsed since `earlier`, zero if `earlier` is later.
    pub fn since(&self, earlier: &Timestamp) -> Duration {
        self.monotonic.saturating_duration_since(earlier.monotonic)
    }

    pub fn wall(&self) -> DateTime<Utc> {
        self.wall
    }

    /// Wall-clock Unix time rounded to the nearest second
    pub fn epoch_seconds(&self) -> i64 {
        let millis = self.wall.timestamp_millis();
        (millis + 500).div_euclid(1000)
    }
}
