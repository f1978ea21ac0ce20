//! Interpolation request

use chrono::Duration;
use crate::filter::AdHocFilter;
use crate::time_range::TimeRange;

/// Complete input of one interpolation call
///
/// `round` and `interval` are already-parsed durations; a zero `round`
/// disables rounding.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationRequest {
    pub raw_sql: String,
    pub filters: Vec<AdHocFilter>,
    pub round: Duration,
    pub interval: Duration,
    pub time_range: TimeRange,
}

impl InterpolationRequest {
    pub fn new(raw_sql: impl Into<String>, time_range: TimeRange) -> Self {
        Self {
            raw_sql: raw_sql.into(),
            filters: Vec::new(),
            round: Duration::zero(),
            interval: Duration::zero(),
            time_range,
        }
    }

    pub fn with_filters(mut self, filters: Vec<AdHocFilter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_round(mut self, round: Duration) -> Self {
        self.round = round;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}
