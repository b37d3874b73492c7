//! Half-open time intervals
//!
//! Every lock and every segment claims a `[start, end)` range of event time.
//! The start instant belongs to the interval, the end instant does not, so
//! `[T1, T2)` and `[T2, T3)` partition time with no gap and no overlap.
//!
//! The canonical text form is `<start>/<end>` with RFC 3339 instants, e.g.
//! `2020-01-01T00:00:00Z/2020-02-01T00:00:00Z`. Serde uses that string form
//! so intervals embed cleanly in identifiers and event payloads.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A half-open `[start, end)` interval over UTC event time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    /// Create an interval, rejecting `end < start`
    ///
    /// `start == end` is allowed and yields an empty interval.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Inclusive start instant
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end instant
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// True when the interval spans no time at all
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check whether `other` lies entirely within this interval
    ///
    /// Containment is inclusive on both edges of the half-open ranges:
    /// an interval contains itself, and `[T1, T3)` contains `[T2, T3)`.
    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Check whether `other` shares at least one instant with this interval
    ///
    /// Abutting intervals do not overlap; empty intervals overlap nothing,
    /// even when their point lies strictly inside the other interval.
    pub fn overlaps(&self, other: &Interval) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start < other.end
            && other.start < self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.end.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (start_raw, end_raw) = s
            .split_once('/')
            .ok_or_else(|| Error::ParseInterval(s.to_string()))?;
        let start = parse_instant(start_raw)?;
        let end = parse_instant(end_raw)?;
        Interval::new(start, end)
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::ParseTimestamp(raw.to_string()))
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
