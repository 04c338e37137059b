//! Half-open time ranges.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The `[begin, end)` time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    /// Canonical empty interval (`begin` at max time, `end` at min time).
    pub const EMPTY: TimeInterval = TimeInterval {
        begin: DateTime::<Utc>::MAX_UTC,
        end: DateTime::<Utc>::MIN_UTC,
    };

    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { begin, end }
    }

    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    pub fn duration(&self) -> Duration {
        if self.is_empty() {
            Duration::zero()
        } else {
            self.end - self.begin
        }
    }

    pub fn contains(&self, other: &TimeInterval) -> bool {
        !other.is_empty() && self.begin <= other.begin && other.end <= self.end
    }

    pub fn contains_time(&self, t: DateTime<Utc>) -> bool {
        self.begin <= t && t < self.end
    }

    /// Open overlap: touching intervals do not intersect.
    pub fn intersects(&self, other: &TimeInterval) -> bool {
        !self.is_empty() && !other.is_empty() && self.begin < other.end && other.begin < self.end
    }

    pub fn intersection(&self, other: &TimeInterval) -> TimeInterval {
        let clipped = TimeInterval::new(self.begin.max(other.begin), self.end.min(other.end));
        if clipped.is_empty() {
            TimeInterval::EMPTY
        } else {
            clipped
        }
    }

    /// `self` minus `other`.
    ///
    /// Always returns at least one element: `[EMPTY]` when `other` covers
    /// `self`, `[self]` when they are disjoint, and otherwise the left and/or
    /// right remainder. Two fragments come back only when `other` is strictly
    /// interior to `self`.
    pub fn subtract(&self, other: &TimeInterval) -> Vec<TimeInterval> {
        if self.is_empty() {
            return vec![TimeInterval::EMPTY];
        }
        if !self.intersects(other) {
            return vec![*self];
        }
        if other.begin <= self.begin && other.end >= self.end {
            return vec![TimeInterval::EMPTY];
        }

        let mut fragments = Vec::with_capacity(2);
        if other.begin > self.begin {
            fragments.push(TimeInterval::new(self.begin, other.begin));
        }
        if other.end < self.end {
            fragments.push(TimeInterval::new(other.end, self.end));
        }
        fragments
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("[empty)");
        }
        write!(
            f,
            "[{}, {})",
            self.begin.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S")
        )
    }
}
