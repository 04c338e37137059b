//! Granularity — the fixed duration one candle represents.

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MONDAY_OFFSET_MS: i64 = 4 * 24 * 60 * 60 * 1000;

/// Exchange kline interval.
///
/// Every variant except `Month` has an exact duration. Calendar months vary
/// between 28 and 31 days, so `Month` is nominally 30 days with a two-day
/// tolerance when validating spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Granularity {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "3m")]
    Minute3,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "2h")]
    Hour2,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "6h")]
    Hour6,
    #[serde(rename = "8h")]
    Hour8,
    #[serde(rename = "12h")]
    Hour12,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "3d")]
    Day3,
    #[serde(rename = "1w")]
    Week1,
    #[serde(rename = "1M")]
    Month1,
}

impl Granularity {
    pub const ALL: [Granularity; 15] = [
        Granularity::Minute1,
        Granularity::Minute3,
        Granularity::Minute5,
        Granularity::Minute15,
        Granularity::Minute30,
        Granularity::Hour1,
        Granularity::Hour2,
        Granularity::Hour4,
        Granularity::Hour6,
        Granularity::Hour8,
        Granularity::Hour12,
        Granularity::Day1,
        Granularity::Day3,
        Granularity::Week1,
        Granularity::Month1,
    ];

    /// Exchange code, e.g. `"15m"` or `"1M"`.
    pub fn code(self) -> &'static str {
        match self {
            Self::Minute1 => "1m",
            Self::Minute3 => "3m",
            Self::Minute5 => "5m",
            Self::Minute15 => "15m",
            Self::Minute30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour2 => "2h",
            Self::Hour4 => "4h",
            Self::Hour6 => "6h",
            Self::Hour8 => "8h",
            Self::Hour12 => "12h",
            Self::Day1 => "1d",
            Self::Day3 => "3d",
            Self::Week1 => "1w",
            Self::Month1 => "1M",
        }
    }

    /// Directory name on disk. Differs from [`code`](Self::code) only for
    /// `Month1`, so that `1m` and `1M` don't collide on case-insensitive
    /// filesystems.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Month1 => "1mo",
            other => other.code(),
        }
    }

    /// Nominal span of one candle.
    pub fn duration(self) -> Duration {
        match self {
            Self::Minute1 => Duration::minutes(1),
            Self::Minute3 => Duration::minutes(3),
            Self::Minute5 => Duration::minutes(5),
            Self::Minute15 => Duration::minutes(15),
            Self::Minute30 => Duration::minutes(30),
            Self::Hour1 => Duration::hours(1),
            Self::Hour2 => Duration::hours(2),
            Self::Hour4 => Duration::hours(4),
            Self::Hour6 => Duration::hours(6),
            Self::Hour8 => Duration::hours(8),
            Self::Hour12 => Duration::hours(12),
            Self::Day1 => Duration::days(1),
            Self::Day3 => Duration::days(3),
            Self::Week1 => Duration::weeks(1),
            Self::Month1 => Duration::days(30),
        }
    }

    /// Allowed deviation of a candle's span from [`duration`](Self::duration).
    pub fn tolerance(self) -> Duration {
        match self {
            Self::Month1 => Duration::days(2),
            _ => Duration::zero(),
        }
    }

    /// Whether `span` is an acceptable candle length for this granularity.
    pub fn accepts_span(self, span: Duration) -> bool {
        let deviation = span - self.duration();
        let tolerance = self.tolerance();
        deviation <= tolerance && deviation >= -tolerance
    }

    /// Open time of the candle containing `t`.
    ///
    /// Fixed intervals are aligned to the Unix epoch, weeks start on Monday
    /// and months on the first day of the month (all UTC).
    pub fn align_down(self, t: DateTime<Utc>) -> DateTime<Utc> {
        if self == Self::Month1 {
            return t
                .date_naive()
                .with_day(1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map_or(t, |naive| naive.and_utc());
        }
        // 1970-01-01 was a Thursday; shift so that weeks start on Monday.
        let offset = if self == Self::Week1 { MONDAY_OFFSET_MS } else { 0 };
        let step = self.duration().num_milliseconds();
        let ms = t.timestamp_millis() - offset;
        let floored = ms - ms.rem_euclid(step) + offset;
        DateTime::from_timestamp_millis(floored).unwrap_or(t)
    }

    /// Open time of the candle following the one that opens at `open_time`.
    pub fn advance(self, open_time: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Month1 => open_time
                .checked_add_months(Months::new(1))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            other => open_time + other.duration(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "1mo" {
            return Ok(Self::Month1);
        }
        Self::ALL
            .into_iter()
            .find(|g| g.code() == s)
            .ok_or_else(|| format!("unknown granularity '{s}'"))
    }
}
