//! Hours-of-Service validation and feasibility engine.
//!
//! Every function here is a pure evaluation over duty periods, hour totals,
//! and an optional cycle snapshot. Infeasibility is an ordinary result, not
//! an error; out-of-range inputs clamp to zero and surface as warnings
//! rather than failing the evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::HosRules;
use crate::cycle::CycleSnapshot;
use crate::duty::{self, DutyPeriod, DutyStatus};

pub const NO_SNAPSHOT_WARNING: &str = "no current HOS status - basic validation only";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Minor,
    Major,
    Critical,
}

impl Severity {
    /// Score penalty applied per violation of this severity.
    pub fn penalty(self) -> f64 {
        match self {
            Severity::Critical => 25.0,
            Severity::Major => 15.0,
            Severity::Minor => 5.0,
            Severity::Warning => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    DailyDrivingLimit,
    DailyOnDutyLimit,
    InsufficientOffDuty,
    ContinuousDrivingWithoutBreak,
    CycleHoursLimit,
    InsufficientDailyDrivingHours,
    InsufficientCycleHours,
    DailyTimeAccounting,
    InvalidInput,
}

impl ViolationKind {
    pub fn severity(self) -> Severity {
        match self {
            ViolationKind::DailyDrivingLimit
            | ViolationKind::DailyOnDutyLimit
            | ViolationKind::CycleHoursLimit => Severity::Critical,
            ViolationKind::ContinuousDrivingWithoutBreak
            | ViolationKind::InsufficientOffDuty
            | ViolationKind::InsufficientDailyDrivingHours
            | ViolationKind::InsufficientCycleHours => Severity::Major,
            ViolationKind::DailyTimeAccounting => Severity::Minor,
            ViolationKind::InvalidInput => Severity::Warning,
        }
    }
}

/// A single regulatory violation with the numbers behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub actual: f64,
    pub limit: f64,
    /// Distance between actual and the limit, in hours.
    pub shortfall: f64,
    pub message: String,
    /// Time window the violation covers, when derived from periods.
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl Violation {
    pub fn new(kind: ViolationKind, actual: f64, limit: f64, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            actual,
            limit,
            shortfall: (actual - limit).abs(),
            message: message.into(),
            window: None,
        }
    }
}

/// Result of a single numeric limit check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitCheck {
    pub compliant: bool,
    pub actual: f64,
    pub limit: f64,
    /// Magnitude of the violation (zero when compliant).
    pub violation_hours: f64,
    /// Margin left before violating (zero when non-compliant).
    pub remaining: f64,
    /// Input was negative and clamped to zero.
    pub clamped: bool,
}

fn clamp_hours(value: f64, what: &str) -> f64 {
    if value < 0.0 {
        warn!(value, what, "negative hour value clamped to zero");
        0.0
    } else {
        value
    }
}

fn check_cap(value: f64, limit: f64, what: &str) -> LimitCheck {
    let clamped = value < 0.0;
    let actual = clamp_hours(value, what);
    LimitCheck {
        compliant: actual <= limit,
        actual,
        limit,
        violation_hours: (actual - limit).max(0.0),
        remaining: (limit - actual).max(0.0),
        clamped,
    }
}

/// Daily driving cap (11 h federal). Exactly at the limit is compliant.
pub fn validate_daily_driving(hours: f64, rules: &HosRules) -> LimitCheck {
    check_cap(hours, rules.max_daily_driving_hours, "daily driving")
}

/// Daily on-duty window cap (14 h federal).
pub fn validate_daily_on_duty(hours: f64, rules: &HosRules) -> LimitCheck {
    check_cap(hours, rules.max_daily_on_duty_hours, "daily on-duty")
}

/// Daily off-duty minimum (10 h federal): a floor, not a cap.
pub fn validate_off_duty(hours: f64, rules: &HosRules) -> LimitCheck {
    let clamped = hours < 0.0;
    let actual = clamp_hours(hours, "off-duty");
    let limit = rules.min_off_duty_hours;
    LimitCheck {
        compliant: actual >= limit,
        actual,
        limit,
        violation_hours: (limit - actual).max(0.0),
        remaining: (actual - limit).max(0.0),
        clamped,
    }
}

/// Result of the break-requirement scan over an ordered period list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakCheck {
    pub compliant: bool,
    pub violations: Vec<Violation>,
    pub breaks_taken: usize,
}

/// Walk periods in start order, accumulating continuous driving time.
///
/// Any off-duty or sleeper-berth period at least `min_break_hours` long
/// resets the accumulator; crossing `max_continuous_driving_hours` before a
/// qualifying break appears records one violation per stretch, tagged with
/// the window from the start of the stretch to the end of the offending
/// period. Breaks count only once fully observed; there is no lookahead.
pub fn validate_break_requirement(periods: &[DutyPeriod], rules: &HosRules) -> BreakCheck {
    let mut ordered: Vec<&DutyPeriod> = periods.iter().collect();
    ordered.sort_by_key(|p| p.start);

    let mut continuous = 0.0_f64;
    let mut continuous_start: Option<DateTime<Utc>> = None;
    let mut breaks_taken = 0;
    let mut violations = Vec::new();
    let mut violated_this_stretch = false;

    for period in ordered {
        match period.status {
            DutyStatus::Driving => {
                if continuous_start.is_none() {
                    continuous_start = Some(period.start);
                }
                continuous += period.duration_hours();
                if continuous > rules.max_continuous_driving_hours && !violated_this_stretch {
                    let stretch_start = continuous_start.unwrap_or(period.start);
                    let mut violation = Violation::new(
                        ViolationKind::ContinuousDrivingWithoutBreak,
                        continuous,
                        rules.max_continuous_driving_hours,
                        format!(
                            "{:.2} h of continuous driving without a {:.0}-minute break",
                            continuous,
                            rules.min_break_hours * 60.0
                        ),
                    );
                    violation.window = Some((stretch_start, period.end));
                    violations.push(violation);
                    violated_this_stretch = true;
                }
            }
            status if status.is_rest() && period.duration_hours() >= rules.min_break_hours => {
                breaks_taken += 1;
                continuous = 0.0;
                continuous_start = None;
                violated_this_stretch = false;
            }
            // On-duty-not-driving and short rests neither extend nor reset
            // the accumulator.
            _ => {}
        }
    }

    BreakCheck {
        compliant: violations.is_empty(),
        violations,
        breaks_taken,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestKind {
    Break,
    DailyReset,
}

/// A rest the schedule must include, positioned by cumulative trip hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredRest {
    pub kind: RestKind,
    /// Cumulative trip-hour offset at which the rest is due.
    pub trigger_hour: f64,
    pub duration_hours: f64,
}

/// Breaks and daily resets a trip of the given size must schedule.
///
/// One break per full block of continuous-driving hours, one 10-hour reset
/// per on-duty window beyond the first.
pub fn compute_required_breaks(
    total_trip_hours: f64,
    driving_hours: f64,
    rules: &HosRules,
) -> Vec<RequiredRest> {
    let total = clamp_hours(total_trip_hours, "total trip hours");
    let driving = clamp_hours(driving_hours, "driving hours");

    let mut rests = Vec::new();

    let break_blocks = (driving / rules.max_continuous_driving_hours).floor() as usize;
    for block in 1..=break_blocks {
        rests.push(RequiredRest {
            kind: RestKind::Break,
            trigger_hour: block as f64 * rules.max_continuous_driving_hours,
            duration_hours: rules.min_break_hours,
        });
    }

    if total > rules.max_daily_on_duty_hours {
        let extra_windows =
            ((total - rules.max_daily_on_duty_hours) / rules.max_daily_on_duty_hours).ceil() as usize;
        for window in 1..=extra_windows {
            rests.push(RequiredRest {
                kind: RestKind::DailyReset,
                trigger_hour: window as f64 * rules.max_daily_on_duty_hours,
                duration_hours: rules.min_off_duty_hours,
            });
        }
    }

    rests.sort_by(|a, b| a.trigger_hour.total_cmp(&b.trigger_hour));
    rests
}

/// Caller-supplied description of a proposed trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripParams {
    pub trip_id: String,
    pub departure: DateTime<Utc>,
    /// Driving duration of each leg in hours, in order.
    pub leg_duration_hours: Vec<f64>,
    pub distance_miles: f64,
}

impl TripParams {
    pub fn total_leg_hours(&self) -> f64 {
        self.leg_duration_hours.iter().sum()
    }
}

/// Outcome of a feasibility evaluation. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub is_feasible: bool,
    /// Rests the schedule must include, in trigger order.
    pub required_rests: Vec<RequiredRest>,
    pub violations: Vec<Violation>,
    pub warnings: Vec<String>,
    /// A break must be inserted before any further driving.
    pub immediate_break_required: bool,
    pub estimated_completion: DateTime<Utc>,
    /// Total trip hours including required rests.
    pub total_trip_hours: f64,
    /// Today's driving budget before the trip, when a snapshot was supplied.
    pub remaining_driving_hours_before: Option<f64>,
    /// Today's driving budget after the trip, floored at zero.
    pub remaining_driving_hours_after: Option<f64>,
}

/// Evaluate whether a proposed trip can be completed legally.
///
/// With a cycle snapshot the driver's remaining daily and cycle budgets are
/// consumed first; without one the check degrades to stateless validation
/// and says so in `warnings`. A daily-budget shortfall is remediable by an
/// inserted 10-hour reset and therefore surfaces as a required rest rather
/// than a violation; a cycle shortfall cannot be remediated inside the trip
/// and makes it infeasible.
pub fn feasibility(
    trip: &TripParams,
    estimated_driving_hours: f64,
    snapshot: Option<&CycleSnapshot>,
    rules: &HosRules,
) -> FeasibilityReport {
    let driving = clamp_hours(estimated_driving_hours, "estimated driving hours");

    let mut violations = Vec::new();
    let mut warnings = Vec::new();
    let mut immediate_break_required = false;
    let mut remaining_before = None;
    let mut remaining_after = None;

    let mut required = compute_required_breaks(trip.total_leg_hours(), driving, rules);

    match snapshot {
        Some(snap) => {
            let before = validate_daily_driving(snap.today_driving_hours, rules).remaining;
            let after = (before - driving).max(0.0);
            remaining_before = Some(before);
            remaining_after = Some(after);

            // The cycle budget cannot be restored by any rest the planner
            // can insert within the trip.
            let cycle_remaining =
                (rules.max_cycle_hours - snap.total_cycle_hours.max(0.0)).max(0.0);
            if driving > cycle_remaining {
                violations.push(Violation::new(
                    ViolationKind::InsufficientCycleHours,
                    cycle_remaining,
                    driving,
                    format!(
                        "{:.1} h of cycle budget remaining, trip needs {:.1} h of driving",
                        cycle_remaining, driving
                    ),
                ));
            }

            // A daily shortfall is covered by scheduling a reset once the
            // remaining budget runs out; it only escalates to a violation
            // when the cycle cannot absorb the trip either.
            if driving > before {
                if violations.is_empty() {
                    required.push(RequiredRest {
                        kind: RestKind::DailyReset,
                        trigger_hour: before,
                        duration_hours: rules.min_off_duty_hours,
                    });
                    required.sort_by(|a, b| a.trigger_hour.total_cmp(&b.trigger_hour));
                } else {
                    violations.push(Violation::new(
                        ViolationKind::InsufficientDailyDrivingHours,
                        before,
                        driving,
                        format!(
                            "{:.1} h of daily driving remaining, trip needs {:.1} h",
                            before, driving
                        ),
                    ));
                }
            }

            if after <= 1.0 {
                warnings.push(format!(
                    "only {:.1} h of daily driving budget remains after this trip",
                    after
                ));
            }

            if let Some(since) = snap.continuous_driving_since {
                let continuous =
                    ((trip.departure - since).num_milliseconds() as f64 / 3_600_000.0).max(0.0);
                if continuous >= rules.max_continuous_driving_hours {
                    immediate_break_required = true;
                    required.insert(
                        0,
                        RequiredRest {
                            kind: RestKind::Break,
                            trigger_hour: 0.0,
                            duration_hours: rules.min_break_hours,
                        },
                    );
                    warnings.push("immediate break required before departure".to_string());
                }
            }
        }
        None => {
            warnings.push(NO_SNAPSHOT_WARNING.to_string());
            // Stateless path: anything past a fresh day's driving cap still
            // needs a reset, even when the on-duty window rule alone would
            // not have demanded one.
            if driving > rules.max_daily_driving_hours
                && !required.iter().any(|r| r.kind == RestKind::DailyReset)
            {
                required.push(RequiredRest {
                    kind: RestKind::DailyReset,
                    trigger_hour: rules.max_daily_driving_hours,
                    duration_hours: rules.min_off_duty_hours,
                });
                required.sort_by(|a, b| a.trigger_hour.total_cmp(&b.trigger_hour));
            }
        }
    }

    let rest_hours: f64 = required.iter().map(|r| r.duration_hours).sum();
    let total_trip_hours = trip.total_leg_hours() + rest_hours;

    FeasibilityReport {
        is_feasible: violations.is_empty(),
        required_rests: required,
        violations,
        warnings,
        immediate_break_required,
        estimated_completion: trip.departure + duty::hours(total_trip_hours),
        total_trip_hours,
        remaining_driving_hours_before: remaining_before,
        remaining_driving_hours_after: remaining_after,
    }
}

/// Aggregated compliance record for a trip or a single log day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// 0-100, weighted by violation severity.
    pub score: f64,
    pub compliant: bool,
    pub violations: Vec<Violation>,
    pub warnings: Vec<String>,
    pub breaks_required: usize,
    pub breaks_scheduled: usize,
    pub resets_required: usize,
    pub resets_scheduled: usize,
}

impl ComplianceReport {
    /// Build a report from collected violations, applying the weighted score
    /// (critical -25, major -15, minor -5, warning -2, floored at zero).
    pub fn from_violations(violations: Vec<Violation>, warnings: Vec<String>) -> Self {
        let mut score = 100.0;
        for violation in &violations {
            score -= violation.severity.penalty();
        }
        Self {
            score: score.max(0.0),
            compliant: violations.is_empty(),
            violations,
            warnings,
            breaks_required: 0,
            breaks_scheduled: 0,
            resets_required: 0,
            resets_scheduled: 0,
        }
    }
}

/// Run the full check set over a trip's periods and produce a scored report.
///
/// Driving and on-duty caps apply per duty period: the totals reset at every
/// qualifying daily rest found in the schedule, with the snapshot's hours
/// seeding the first one. The calendar-day variant of these checks lives in
/// the log segmenter.
pub fn score_and_report(
    periods: &[DutyPeriod],
    snapshot: Option<&CycleSnapshot>,
    rules: &HosRules,
) -> ComplianceReport {
    let mut violations = Vec::new();
    let mut warnings = Vec::new();

    let (start_driving, start_on_duty, start_cycle) = match snapshot {
        Some(snap) => {
            for (value, what) in [
                (snap.today_driving_hours, "today driving hours"),
                (snap.today_on_duty_hours, "today on-duty hours"),
                (snap.total_cycle_hours, "cycle hours"),
            ] {
                if value < 0.0 {
                    violations.push(Violation::new(
                        ViolationKind::InvalidInput,
                        value,
                        0.0,
                        format!("negative {} ({:.2}) clamped to zero", what, value),
                    ));
                }
            }
            (
                snap.today_driving_hours.max(0.0),
                snap.today_on_duty_hours.max(0.0),
                snap.total_cycle_hours.max(0.0),
            )
        }
        None => {
            warnings.push(NO_SNAPSHOT_WARNING.to_string());
            (0.0, 0.0, 0.0)
        }
    };

    let mut ordered: Vec<&DutyPeriod> = periods.iter().collect();
    ordered.sort_by_key(|p| p.start);

    let mut shifts: Vec<(f64, f64)> = vec![(start_driving, start_on_duty)];
    let mut driving_total = 0.0_f64;
    let mut on_duty_total = 0.0_f64;
    let mut trip_hours = 0.0_f64;
    for period in &ordered {
        let hours = period.duration_hours();
        trip_hours += hours;
        if period.status.is_rest() && hours >= rules.min_off_duty_hours {
            shifts.push((0.0, 0.0));
            continue;
        }
        if let Some(shift) = shifts.last_mut() {
            match period.status {
                DutyStatus::Driving => {
                    shift.0 += hours;
                    shift.1 += hours;
                    driving_total += hours;
                    on_duty_total += hours;
                }
                DutyStatus::OnDutyNotDriving => {
                    shift.1 += hours;
                    on_duty_total += hours;
                }
                _ => {}
            }
        }
    }

    for (index, (driving, on_duty)) in shifts.iter().enumerate() {
        let check = validate_daily_driving(*driving, rules);
        if !check.compliant {
            violations.push(Violation::new(
                ViolationKind::DailyDrivingLimit,
                check.actual,
                check.limit,
                format!(
                    "{:.2} h of driving in duty period {} exceeds the {:.0} h limit",
                    check.actual,
                    index + 1,
                    check.limit
                ),
            ));
        }
        let check = validate_daily_on_duty(*on_duty, rules);
        if !check.compliant {
            violations.push(Violation::new(
                ViolationKind::DailyOnDutyLimit,
                check.actual,
                check.limit,
                format!(
                    "{:.2} h on duty in duty period {} exceeds the {:.0} h window",
                    check.actual,
                    index + 1,
                    check.limit
                ),
            ));
        }
    }

    if snapshot.is_some() {
        let cycle_after = start_cycle + on_duty_total;
        if cycle_after > rules.max_cycle_hours {
            violations.push(Violation::new(
                ViolationKind::CycleHoursLimit,
                cycle_after,
                rules.max_cycle_hours,
                format!(
                    "{:.1} h on duty in the rolling cycle exceeds the {:.0} h budget",
                    cycle_after, rules.max_cycle_hours
                ),
            ));
        }
    }

    let break_check = validate_break_requirement(periods, rules);
    let breaks_scheduled = break_check.breaks_taken;
    violations.extend(break_check.violations);

    let required = compute_required_breaks(trip_hours, driving_total, rules);
    let breaks_required = required.iter().filter(|r| r.kind == RestKind::Break).count();
    let resets_required = required
        .iter()
        .filter(|r| r.kind == RestKind::DailyReset)
        .count();
    let resets_scheduled = periods
        .iter()
        .filter(|p| p.status.is_rest() && p.duration_hours() >= rules.min_off_duty_hours)
        .count();

    let mut report = ComplianceReport::from_violations(violations, warnings);
    report.breaks_required = breaks_required;
    report.breaks_scheduled = breaks_scheduled;
    report.resets_required = resets_required;
    report.resets_scheduled = resets_scheduled;
    report
}
