//! Duty statuses and duty-status periods.
//!
//! A `DutyPeriod` is the atomic unit of an HOS schedule: a half-open time
//! interval tagged with what the driver was doing during it.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// The four regulated duty statuses of an ELD record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DutyStatus {
    OffDuty,
    SleeperBerth,
    Driving,
    OnDutyNotDriving,
}

impl DutyStatus {
    /// Statuses that can satisfy the 30-minute break requirement.
    pub fn is_rest(self) -> bool {
        matches!(self, DutyStatus::OffDuty | DutyStatus::SleeperBerth)
    }

    /// Statuses that count against the rolling on-duty cycle.
    pub fn is_on_duty(self) -> bool {
        matches!(self, DutyStatus::Driving | DutyStatus::OnDutyNotDriving)
    }

    pub fn label(self) -> &'static str {
        match self {
            DutyStatus::OffDuty => "off_duty",
            DutyStatus::SleeperBerth => "sleeper_berth",
            DutyStatus::Driving => "driving",
            DutyStatus::OnDutyNotDriving => "on_duty_not_driving",
        }
    }
}

/// A single duty-status interval `[start, end)`.
///
/// Periods belonging to one resolved trip are contiguous and non-overlapping;
/// the planner guarantees this, it is not an input constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutyPeriod {
    pub status: DutyStatus,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub start_location: (f64, f64),
    pub end_location: (f64, f64),
    pub start_address: String,
    pub end_address: String,
    /// Miles traveled during this period. Zero for anything but driving.
    pub distance_miles: f64,
    pub remark: Option<String>,
    /// Sequence number of the stop whose time window produced this period.
    pub related_stop: Option<u32>,
}

impl DutyPeriod {
    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 3_600_000.0
    }

    /// Whether `instant` falls within `[start, end)`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// True when the period extends past the midnight after `start`.
    ///
    /// A period ending exactly at midnight does not cross; the end bound is
    /// exclusive.
    pub fn crosses_midnight(&self) -> bool {
        self.end > next_midnight(self.start)
    }
}

/// The midnight boundary immediately after `t` (start of the next UTC day).
pub fn next_midnight(t: DateTime<Utc>) -> DateTime<Utc> {
    let next_day = t.date_naive() + Duration::days(1);
    next_day.and_time(NaiveTime::MIN).and_utc()
}

/// Fractional hours as a chrono duration, rounded to the millisecond.
pub fn hours(h: f64) -> Duration {
    Duration::milliseconds((h * 3_600_000.0).round() as i64)
}
