//! Compliance engine tests
//!
//! Limit boundaries, the break-requirement scan, required-rest computation,
//! and feasibility with and without a cycle snapshot.

use chrono::{DateTime, TimeZone, Utc};

use hos_planner::compliance::{
    self, NO_SNAPSHOT_WARNING, RestKind, TripParams, ViolationKind, compute_required_breaks,
    validate_break_requirement, validate_daily_driving, validate_daily_on_duty, validate_off_duty,
};
use hos_planner::config::HosRules;
use hos_planner::cycle::CycleSnapshot;
use hos_planner::duty::{DutyPeriod, DutyStatus};

// ============================================================================
// Test Fixtures
// ============================================================================

fn depart() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap()
}

fn period(status: DutyStatus, start: DateTime<Utc>, end: DateTime<Utc>) -> DutyPeriod {
    DutyPeriod {
        status,
        start,
        end,
        start_location: (36.17, -115.14),
        end_location: (36.17, -115.14),
        start_address: String::new(),
        end_address: String::new(),
        distance_miles: 0.0,
        remark: None,
        related_stop: None,
    }
}

fn hours_after(base: DateTime<Utc>, h: f64) -> DateTime<Utc> {
    base + chrono::Duration::milliseconds((h * 3_600_000.0).round() as i64)
}

fn snapshot(driving: f64, on_duty: f64, cycle: f64) -> CycleSnapshot {
    CycleSnapshot {
        total_cycle_hours: cycle,
        today_driving_hours: driving,
        today_on_duty_hours: on_duty,
        current_duty_status: DutyStatus::OffDuty,
        current_status_start: depart(),
        continuous_driving_since: None,
        last_break_end: None,
    }
}

fn trip(leg_hours: &[f64]) -> TripParams {
    TripParams {
        trip_id: "trip-1".to_string(),
        departure: depart(),
        leg_duration_hours: leg_hours.to_vec(),
        distance_miles: leg_hours.iter().sum::<f64>() * 55.0,
    }
}

// ============================================================================
// Limit Boundary Tests
// ============================================================================

#[test]
fn test_daily_driving_at_limit_is_compliant() {
    let rules = HosRules::default();
    let check = validate_daily_driving(11.0, &rules);
    assert!(check.compliant);
    assert_eq!(check.violation_hours, 0.0);
    assert_eq!(check.remaining, 0.0);
}

#[test]
fn test_daily_driving_just_over_limit() {
    let rules = HosRules::default();
    let check = validate_daily_driving(11.01, &rules);
    assert!(!check.compliant);
    assert!((check.violation_hours - 0.01).abs() < 1e-9);
}

#[test]
fn test_daily_on_duty_limit() {
    let rules = HosRules::default();
    assert!(validate_daily_on_duty(14.0, &rules).compliant);
    assert!(!validate_daily_on_duty(14.5, &rules).compliant);
}

#[test]
fn test_off_duty_is_a_floor() {
    let rules = HosRules::default();
    assert!(validate_off_duty(10.0, &rules).compliant);

    let short = validate_off_duty(8.0, &rules);
    assert!(!short.compliant);
    assert!((short.violation_hours - 2.0).abs() < 1e-9);
}

#[test]
fn test_negative_input_clamps_instead_of_failing() {
    let rules = HosRules::default();
    let check = validate_daily_driving(-3.0, &rules);
    assert!(check.clamped);
    assert!(check.compliant);
    assert_eq!(check.actual, 0.0);
}

// ============================================================================
// Break Requirement Scan
// ============================================================================

#[test]
fn test_break_idempotence() {
    let rules = HosRules::default();
    let start = depart();

    // Eight hours of driving, a qualifying break, then one more hour.
    let with_break = vec![
        period(DutyStatus::Driving, start, hours_after(start, 8.0)),
        period(DutyStatus::OffDuty, hours_after(start, 8.0), hours_after(start, 8.5)),
        period(DutyStatus::Driving, hours_after(start, 8.5), hours_after(start, 9.5)),
    ];
    let check = validate_break_requirement(&with_break, &rules);
    assert!(check.compliant);
    assert_eq!(check.breaks_taken, 1);

    // Removing the break reintroduces exactly one violation.
    let without_break = vec![
        period(DutyStatus::Driving, start, hours_after(start, 8.0)),
        period(DutyStatus::Driving, hours_after(start, 8.0), hours_after(start, 9.0)),
    ];
    let check = validate_break_requirement(&without_break, &rules);
    assert!(!check.compliant);
    assert_eq!(check.violations.len(), 1);
    assert_eq!(
        check.violations[0].kind,
        ViolationKind::ContinuousDrivingWithoutBreak
    );
    // The violation window spans the continuous stretch.
    assert_eq!(
        check.violations[0].window,
        Some((start, hours_after(start, 9.0)))
    );
}

#[test]
fn test_short_rest_does_not_reset_accumulator() {
    let rules = HosRules::default();
    let start = depart();

    // A 15-minute rest is not a qualifying break.
    let periods = vec![
        period(DutyStatus::Driving, start, hours_after(start, 5.0)),
        period(DutyStatus::OffDuty, hours_after(start, 5.0), hours_after(start, 5.25)),
        period(DutyStatus::Driving, hours_after(start, 5.25), hours_after(start, 9.25)),
    ];
    let check = validate_break_requirement(&periods, &rules);
    assert!(!check.compliant);
    assert_eq!(check.breaks_taken, 0);
}

#[test]
fn test_borderline_break_started_before_threshold_counts() {
    let rules = HosRules::default();
    let start = depart();

    // The break starts at 7.9 h of continuous driving; once fully observed
    // it resets the accumulator, so the later driving is a fresh stretch.
    let periods = vec![
        period(DutyStatus::Driving, start, hours_after(start, 7.9)),
        period(DutyStatus::SleeperBerth, hours_after(start, 7.9), hours_after(start, 8.4)),
        period(DutyStatus::Driving, hours_after(start, 8.4), hours_after(start, 12.0)),
    ];
    let check = validate_break_requirement(&periods, &rules);
    assert!(check.compliant);
    assert_eq!(check.breaks_taken, 1);
}

// ============================================================================
// Required Rest Computation
// ============================================================================

#[test]
fn test_required_breaks_for_ten_hour_trip() {
    let rules = HosRules::default();
    let rests = compute_required_breaks(10.0, 10.0, &rules);

    assert_eq!(rests.len(), 1);
    assert_eq!(rests[0].kind, RestKind::Break);
    assert_eq!(rests[0].trigger_hour, 8.0);
    assert_eq!(rests[0].duration_hours, 0.5);
}

#[test]
fn test_required_rests_for_long_trip() {
    let rules = HosRules::default();
    let rests = compute_required_breaks(30.0, 30.0, &rules);

    let breaks: Vec<f64> = rests
        .iter()
        .filter(|r| r.kind == RestKind::Break)
        .map(|r| r.trigger_hour)
        .collect();
    let resets: Vec<f64> = rests
        .iter()
        .filter(|r| r.kind == RestKind::DailyReset)
        .map(|r| r.trigger_hour)
        .collect();

    assert_eq!(breaks, vec![8.0, 16.0, 24.0]);
    assert_eq!(resets, vec![14.0, 28.0]);

    // Sorted by trigger hour overall.
    let triggers: Vec<f64> = rests.iter().map(|r| r.trigger_hour).collect();
    let mut sorted = triggers.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    assert_eq!(triggers, sorted);
}

#[test]
fn test_no_rests_for_short_trip() {
    let rules = HosRules::default();
    assert!(compute_required_breaks(6.0, 6.0, &rules).is_empty());
}

// ============================================================================
// Feasibility
// ============================================================================

#[test]
fn test_feasibility_without_snapshot_degrades_to_basic() {
    let rules = HosRules::default();
    let report = compliance::feasibility(&trip(&[2.5]), 2.5, None, &rules);

    assert!(report.is_feasible);
    assert!(report.warnings.iter().any(|w| w == NO_SNAPSHOT_WARNING));
    assert!(report.remaining_driving_hours_before.is_none());
}

#[test]
fn test_feasibility_with_nearly_spent_daily_budget() {
    // Driver has 9.5 h driving and 10 h on duty today, 40 h of cycle used.
    // A 2.5 h trip is feasible with a reset covering the overflow.
    let rules = HosRules::default();
    let snap = snapshot(9.5, 10.0, 40.0);
    let report = compliance::feasibility(&trip(&[2.5]), 2.5, Some(&snap), &rules);

    assert!(report.is_feasible);
    assert!(report.violations.is_empty());
    assert_eq!(report.remaining_driving_hours_before, Some(1.5));
    assert_eq!(report.remaining_driving_hours_after, Some(0.0));
    assert!(
        report
            .required_rests
            .iter()
            .any(|r| r.kind == RestKind::DailyReset && (r.trigger_hour - 1.5).abs() < 1e-9)
    );
    // Post-trip budget at or under an hour triggers the low-budget warning.
    assert!(report.warnings.iter().any(|w| w.contains("daily driving budget")));
}

#[test]
fn test_feasibility_cycle_shortfall_is_infeasible() {
    let rules = HosRules::default();
    let snap = snapshot(0.0, 0.0, 69.0);
    let report = compliance::feasibility(&trip(&[2.0]), 2.0, Some(&snap), &rules);

    assert!(!report.is_feasible);
    assert_eq!(report.violations.len(), 1);
    let violation = &report.violations[0];
    assert_eq!(violation.kind, ViolationKind::InsufficientCycleHours);
    assert!((violation.shortfall - 1.0).abs() < 1e-9);
}

#[test]
fn test_feasibility_reports_daily_shortfall_when_cycle_also_exhausted() {
    let rules = HosRules::default();
    let snap = snapshot(10.0, 10.0, 69.0);
    let report = compliance::feasibility(&trip(&[2.0]), 2.0, Some(&snap), &rules);

    assert!(!report.is_feasible);
    let kinds: Vec<ViolationKind> = report.violations.iter().map(|v| v.kind).collect();
    assert!(kinds.contains(&ViolationKind::InsufficientCycleHours));
    assert!(kinds.contains(&ViolationKind::InsufficientDailyDrivingHours));
}

#[test]
fn test_feasibility_immediate_break_directive() {
    let rules = HosRules::default();
    let mut snap = snapshot(8.5, 9.0, 30.0);
    snap.continuous_driving_since = Some(hours_after(depart(), -8.5));

    let report = compliance::feasibility(&trip(&[1.0]), 1.0, Some(&snap), &rules);

    assert!(report.immediate_break_required);
    let first = &report.required_rests[0];
    assert_eq!(first.kind, RestKind::Break);
    assert_eq!(first.trigger_hour, 0.0);
}

// ============================================================================
// Scoring
// ============================================================================

#[test]
fn test_score_and_report_weights_violations() {
    let rules = HosRules::default();
    let start = depart();

    // Twelve straight driving hours: over the daily cap (critical, -25) and
    // past the continuous-driving threshold (major, -15).
    let periods = vec![period(DutyStatus::Driving, start, hours_after(start, 12.0))];
    let report = compliance::score_and_report(&periods, None, &rules);

    assert!(!report.compliant);
    assert!((report.score - 60.0).abs() < 1e-9);
    assert_eq!(report.breaks_required, 1);
    assert_eq!(report.breaks_scheduled, 0);
}

#[test]
fn test_score_resets_budgets_at_daily_rest() {
    let rules = HosRules::default();
    let start = depart();

    // Ten hours driving, a 10-hour reset, then eight more hours: each duty
    // period stays inside its own budget.
    let periods = vec![
        period(DutyStatus::Driving, start, hours_after(start, 8.0)),
        period(DutyStatus::OffDuty, hours_after(start, 8.0), hours_after(start, 8.5)),
        period(DutyStatus::Driving, hours_after(start, 8.5), hours_after(start, 10.5)),
        period(DutyStatus::SleeperBerth, hours_after(start, 10.5), hours_after(start, 20.5)),
        period(DutyStatus::Driving, hours_after(start, 20.5), hours_after(start, 28.5)),
    ];
    let report = compliance::score_and_report(&periods, None, &rules);

    assert!(report.compliant, "violations: {:?}", report.violations);
    assert_eq!(report.score, 100.0);
    assert_eq!(report.resets_scheduled, 1);
}

#[test]
fn test_score_includes_starting_hours_from_snapshot() {
    let rules = HosRules::default();
    let start = depart();
    let snap = snapshot(9.0, 9.0, 40.0);

    // Three more driving hours on top of nine already driven today.
    let periods = vec![period(DutyStatus::Driving, start, hours_after(start, 3.0))];
    let report = compliance::score_and_report(&periods, Some(&snap), &rules);

    assert!(
        report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::DailyDrivingLimit)
    );
}

#[test]
fn test_score_cycle_limit_check() {
    let rules = HosRules::default();
    let start = depart();
    let snap = snapshot(0.0, 0.0, 68.0);

    let periods = vec![period(DutyStatus::Driving, start, hours_after(start, 3.0))];
    let report = compliance::score_and_report(&periods, Some(&snap), &rules);

    assert!(
        report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::CycleHoursLimit)
    );
}
