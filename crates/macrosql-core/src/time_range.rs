//! Absolute dashboard time range

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive `[from, to]` range of UTC timestamps
///
/// Construct through [`TimeRange::new`], which enforces `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeRange")]
pub struct TimeRange {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawTimeRange {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl TryFrom<RawTimeRange> for TimeRange {
    type Error = TimeRangeError;

    fn try_from(raw: RawTimeRange) -> Result<Self, Self::Error> {
        TimeRange::new(raw.from, raw.to)
    }
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, TimeRangeError> {
        if from > to {
            return Err(TimeRangeError::Inverted { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    /// Round both bounds to the nearest multiple of `unit`
    ///
    /// Units below one millisecond leave the range untouched.
    pub fn round(&self, unit: Duration) -> Result<Self, TimeRangeError> {
        let unit_ms = unit.num_milliseconds();
        if unit_ms <= 0 {
            return Ok(*self);
        }

        let from = round_to_nearest(self.from, unit_ms)?;
        let to = round_to_nearest(self.to, unit_ms)?;
        Self::new(from, to)
    }
}

fn round_to_nearest(ts: DateTime<Utc>, unit_ms: i64) -> Result<DateTime<Utc>, TimeRangeError> {
    let millis = ts.timestamp_millis();
    let remainder = millis.rem_euclid(unit_ms);
    let floor = millis - remainder;
    let rounded = if remainder * 2 >= unit_ms {
        floor.checked_add(unit_ms)
    } else {
        Some(floor)
    };

    rounded
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or(TimeRangeError::OutOfRange(ts))
}

/// Time range errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeRangeError {
    #[error("invalid time range: from ({from}) is after to ({to})")]
    Inverted { from: DateTime<Utc>, to: DateTime<Utc> },

    #[error("timestamp {0} cannot be rounded")]
    OutOfRange(DateTime<Utc>),
}
