//! Daily log segmentation and the fixed-resolution duty grid.
//!
//! Takes the duty periods of one trip, partitions them into calendar days
//! (splitting anything that crosses midnight), and re-runs the per-day
//! compliance checks so each day can be certified on its own.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::compliance::{self, ComplianceReport, RestKind, Violation, ViolationKind};
use crate::config::{HosRules, SplitDistanceRule};
use crate::duty::{self, DutyPeriod, DutyStatus};

/// Tolerance for the 24-hour accounting check, in hours.
const ACCOUNTING_TOLERANCE_HOURS: f64 = 0.1;

/// Split any period crossing midnight into per-day synthetic periods.
///
/// Both halves keep the status, locations, and remark. Distance follows
/// `rule`; the preserved default attributes all miles to the pre-midnight
/// half, since distance bookkeeping is leg-relative rather than
/// period-relative.
pub fn split_at_midnight(periods: &[DutyPeriod], rule: SplitDistanceRule) -> Vec<DutyPeriod> {
    let mut out = Vec::with_capacity(periods.len());
    for period in periods {
        let mut rest = period.clone();
        while rest.crosses_midnight() {
            let boundary = duty::next_midnight(rest.start);
            let (first_miles, second_miles) = match rule {
                SplitDistanceRule::FirstHalf => (rest.distance_miles, 0.0),
                SplitDistanceRule::Proportional => {
                    let total = rest.duration_hours();
                    let share = if total > 0.0 {
                        (boundary - rest.start).num_milliseconds() as f64 / 3_600_000.0 / total
                    } else {
                        1.0
                    };
                    (rest.distance_miles * share, rest.distance_miles * (1.0 - share))
                }
            };
            let mut first = rest.clone();
            first.end = boundary;
            first.distance_miles = first_miles;
            out.push(first);
            rest.start = boundary;
            rest.distance_miles = second_miles;
        }
        out.push(rest);
    }
    out
}

/// Periods grouped by the calendar date they start on, midnight-split first.
pub fn group_by_day(
    periods: &[DutyPeriod],
    rule: SplitDistanceRule,
) -> BTreeMap<NaiveDate, Vec<DutyPeriod>> {
    let mut days: BTreeMap<NaiveDate, Vec<DutyPeriod>> = BTreeMap::new();
    for period in split_at_midnight(periods, rule) {
        days.entry(period.start.date_naive()).or_default().push(period);
    }
    for day in days.values_mut() {
        day.sort_by_key(|p| p.start);
    }
    days
}

/// Fixed-resolution visualization grid for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLogGrid {
    /// One status per grid step, midnight to midnight.
    pub points: Vec<DutyStatus>,
    /// Grid points between the day's first and last period that no period
    /// covered. These are filled as off-duty, but a correctly synthesized
    /// schedule never produces them; nonzero is a diagnostic signal.
    pub uncovered_points: usize,
}

/// Per-status hour totals for one day.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusTotals {
    pub off_duty: f64,
    pub sleeper_berth: f64,
    pub driving: f64,
    pub on_duty_not_driving: f64,
}

impl StatusTotals {
    pub fn add(&mut self, status: DutyStatus, hours: f64) {
        match status {
            DutyStatus::OffDuty => self.off_duty += hours,
            DutyStatus::SleeperBerth => self.sleeper_berth += hours,
            DutyStatus::Driving => self.driving += hours,
            DutyStatus::OnDutyNotDriving => self.on_duty_not_driving += hours,
        }
    }

    pub fn total(&self) -> f64 {
        self.off_duty + self.sleeper_berth + self.driving + self.on_duty_not_driving
    }
}

/// One certified day of the driver's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    pub date: NaiveDate,
    pub periods: Vec<DutyPeriod>,
    pub grid: DailyLogGrid,
    pub totals: StatusTotals,
    pub total_distance_miles: f64,
    pub report: ComplianceReport,
    pub grade: String,
}

/// Build the per-day logs for a trip. Days are independent of each other, so
/// validation runs in parallel.
pub fn build_daily_logs(periods: &[DutyPeriod], rules: &HosRules) -> Vec<DailyLog> {
    let days: Vec<(NaiveDate, Vec<DutyPeriod>)> =
        group_by_day(periods, rules.split_distance_rule).into_iter().collect();

    days.into_par_iter()
        .map(|(date, day_periods)| build_day(date, day_periods, rules))
        .collect()
}

/// Letter grade for a day's compliance score.
pub fn letter_grade(score: f64) -> &'static str {
    if score >= 95.0 {
        "A+"
    } else if score >= 90.0 {
        "A"
    } else if score >= 80.0 {
        "B"
    } else if score >= 70.0 {
        "C"
    } else if score >= 65.0 {
        "D"
    } else {
        "F"
    }
}

fn build_day(date: NaiveDate, periods: Vec<DutyPeriod>, rules: &HosRules) -> DailyLog {
    let day_start = date.and_time(NaiveTime::MIN).and_utc();
    let day_end = day_start + Duration::days(1);

    let grid = build_grid(day_start, &periods, rules);

    // Totals come from the periods, clipped to the day; time no period
    // covers counts as off duty.
    let mut totals = StatusTotals::default();
    let mut clipped: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::with_capacity(periods.len());
    for period in &periods {
        let start = period.start.max(day_start);
        let end = period.end.min(day_end);
        if end > start {
            totals.add(period.status, (end - start).num_milliseconds() as f64 / 3_600_000.0);
            clipped.push((start, end));
        }
    }
    let uncovered = 24.0 - union_hours(&mut clipped);
    totals.add(DutyStatus::OffDuty, uncovered.max(0.0));

    let mut violations = Vec::new();

    let driving_check = compliance::validate_daily_driving(totals.driving, rules);
    if !driving_check.compliant {
        violations.push(Violation::new(
            ViolationKind::DailyDrivingLimit,
            driving_check.actual,
            driving_check.limit,
            format!(
                "{:.2} h of driving on {} exceeds the {:.0} h daily limit",
                driving_check.actual, date, driving_check.limit
            ),
        ));
    }

    let on_duty_hours = totals.driving + totals.on_duty_not_driving;
    let on_duty_check = compliance::validate_daily_on_duty(on_duty_hours, rules);
    if !on_duty_check.compliant {
        violations.push(Violation::new(
            ViolationKind::DailyOnDutyLimit,
            on_duty_check.actual,
            on_duty_check.limit,
            format!(
                "{:.2} h on duty on {} exceeds the {:.0} h window",
                on_duty_check.actual, date, on_duty_check.limit
            ),
        ));
    }

    let off_duty_hours = totals.off_duty + totals.sleeper_berth;
    let off_check = compliance::validate_off_duty(off_duty_hours, rules);
    if !off_check.compliant {
        violations.push(Violation::new(
            ViolationKind::InsufficientOffDuty,
            off_check.actual,
            off_check.limit,
            format!(
                "{:.2} h off duty on {} is under the {:.0} h minimum",
                off_check.actual, date, off_check.limit
            ),
        ));
    }

    let break_check = compliance::validate_break_requirement(&periods, rules);
    let breaks_scheduled = break_check.breaks_taken;
    violations.extend(break_check.violations);

    // 24-hour conservation. Overlapping periods push the sum past a day;
    // this is an internal bug signal, surfaced instead of corrected.
    let accounted = totals.total();
    if (accounted - 24.0).abs() > ACCOUNTING_TOLERANCE_HOURS {
        warn!(%date, accounted, "daily totals do not sum to 24 h");
        violations.push(Violation::new(
            ViolationKind::DailyTimeAccounting,
            accounted,
            24.0,
            format!("{} accounts for {:.2} h instead of 24.00 h", date, accounted),
        ));
    }

    let required = compliance::compute_required_breaks(on_duty_hours, totals.driving, rules);
    let total_distance_miles = periods.iter().map(|p| p.distance_miles).sum();

    let mut report = ComplianceReport::from_violations(violations, Vec::new());
    report.breaks_required = required.iter().filter(|r| r.kind == RestKind::Break).count();
    report.breaks_scheduled = breaks_scheduled;
    report.resets_required = required
        .iter()
        .filter(|r| r.kind == RestKind::DailyReset)
        .count();
    report.resets_scheduled = periods
        .iter()
        .filter(|p| p.status.is_rest() && p.duration_hours() >= rules.min_off_duty_hours)
        .count();

    let grade = letter_grade(report.score).to_string();

    DailyLog {
        date,
        periods,
        grid,
        totals,
        total_distance_miles,
        report,
        grade,
    }
}

fn build_grid(day_start: DateTime<Utc>, periods: &[DutyPeriod], rules: &HosRules) -> DailyLogGrid {
    let step = Duration::minutes(rules.grid_resolution_minutes as i64);
    let count = rules.grid_points_per_day();

    let first_start = periods.iter().map(|p| p.start).min();
    let last_end = periods.iter().map(|p| p.end).max();

    let mut points = Vec::with_capacity(count);
    let mut uncovered_points = 0;
    for i in 0..count {
        let instant = day_start + step * i as i32;
        match periods.iter().find(|p| p.contains(instant)) {
            Some(period) => points.push(period.status),
            None => {
                // Leading and trailing slack on a partial day is expected;
                // a hole between periods is not.
                if let (Some(first), Some(last)) = (first_start, last_end) {
                    if instant >= first && instant < last {
                        uncovered_points += 1;
                    }
                }
                points.push(DutyStatus::OffDuty);
            }
        }
    }

    if uncovered_points > 0 {
        warn!(uncovered_points, "daily grid has gaps between periods");
    }

    DailyLogGrid {
        points,
        uncovered_points,
    }
}

/// Sum of the union of the given intervals, in hours. Sorts in place.
fn union_hours(intervals: &mut [(DateTime<Utc>, DateTime<Utc>)]) -> f64 {
    intervals.sort();
    let mut total = 0.0;
    let mut current: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
    for &(start, end) in intervals.iter() {
        match current {
            Some((_, cur_end)) if start <= cur_end => {
                if let Some(cur) = current.as_mut() {
                    cur.1 = cur.1.max(end);
                }
            }
            _ => {
                if let Some((s, e)) = current {
                    total += (e - s).num_milliseconds() as f64 / 3_600_000.0;
                }
                current = Some((start, end));
            }
        }
    }
    if let Some((s, e)) = current {
        total += (e - s).num_milliseconds() as f64 / 3_600_000.0;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_grades() {
        assert_eq!(letter_grade(100.0), "A+");
        assert_eq!(letter_grade(95.0), "A+");
        assert_eq!(letter_grade(90.0), "A");
        assert_eq!(letter_grade(85.0), "B");
        assert_eq!(letter_grade(75.0), "C");
        assert_eq!(letter_grade(66.0), "D");
        assert_eq!(letter_grade(0.0), "F");
    }
}
