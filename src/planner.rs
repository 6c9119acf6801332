//! Route-to-schedule planner.
//!
//! Walks a trip's resolved legs in order and projects them onto a timeline
//! of stops and duty-status periods, asking the compliance engine where
//! breaks and resets must land. The resulting period list is contiguous:
//! each period starts exactly where the previous one ended.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compliance::{self, ComplianceReport, FeasibilityReport, TripParams};
use crate::config::HosRules;
use crate::cycle::CycleSnapshot;
use crate::duty::{self, DutyPeriod, DutyStatus};
use crate::route::{LegKind, RouteError, RouteLeg};
use crate::stop::{self, Stop, StopType};

const EPSILON_HOURS: f64 = 1e-9;

#[derive(Debug)]
pub enum PlanError {
    /// The routing provider failed for a leg; planning cannot continue.
    /// Distinct from infeasibility, which is an ordinary plan result.
    Route(RouteError),
    EmptyRoute,
    /// A leg had a non-positive distance or duration (0-based index).
    InvalidLeg(usize),
}

impl From<RouteError> for PlanError {
    fn from(err: RouteError) -> Self {
        PlanError::Route(err)
    }
}

/// A fully planned trip: ordered stops, contiguous duty periods, and the
/// compliance picture for the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlan {
    pub stops: Vec<Stop>,
    pub periods: Vec<DutyPeriod>,
    pub feasibility: FeasibilityReport,
    pub compliance: ComplianceReport,
    pub departure: DateTime<Utc>,
    pub completion: DateTime<Utc>,
    pub total_distance_miles: f64,
}

/// Internal stop candidate positioned by driving time within one leg.
#[derive(Debug, Clone)]
struct Candidate {
    stop_type: StopType,
    /// Hours of driving into the leg.
    offset_hours: f64,
    /// Miles into the leg.
    distance_miles: f64,
    duration_hours: f64,
}

/// HOS counters threaded through the legs while planning.
#[derive(Debug, Clone, Copy)]
struct PlannerState {
    continuous_driving_hours: f64,
    today_driving_hours: f64,
    today_on_duty_hours: f64,
}

/// Accumulates the timeline as stops and periods are emitted.
struct ScheduleBuilder {
    cursor: DateTime<Utc>,
    sequence: u32,
    stops: Vec<Stop>,
    periods: Vec<DutyPeriod>,
}

impl ScheduleBuilder {
    fn new(departure: DateTime<Utc>) -> Self {
        Self {
            cursor: departure,
            sequence: 1,
            stops: Vec::new(),
            periods: Vec::new(),
        }
    }

    fn push_driving(
        &mut self,
        from: (f64, f64),
        from_address: &str,
        to: (f64, f64),
        to_address: &str,
        hours: f64,
        miles: f64,
    ) {
        if hours <= EPSILON_HOURS {
            return;
        }
        let end = self.cursor + duty::hours(hours);
        self.periods.push(DutyPeriod {
            status: DutyStatus::Driving,
            start: self.cursor,
            end,
            start_location: from,
            end_location: to,
            start_address: from_address.to_string(),
            end_address: to_address.to_string(),
            distance_miles: miles,
            remark: None,
            related_stop: None,
        });
        self.cursor = end;
    }

    fn push_stop(
        &mut self,
        stop_type: StopType,
        location: (f64, f64),
        address: String,
        distance_from_origin: f64,
        duration_hours: f64,
        remark: &str,
    ) {
        let departure = self.cursor + duty::hours(duration_hours);
        let stop = Stop {
            sequence: self.sequence,
            stop_type,
            location,
            address: address.clone(),
            distance_from_origin_miles: distance_from_origin,
            arrival: self.cursor,
            departure,
            duration_hours,
            required_for_compliance: stop_type.required_for_compliance(),
        };
        if duration_hours > EPSILON_HOURS {
            self.periods.push(DutyPeriod {
                status: stop_type.duty_status(),
                start: stop.arrival,
                end: stop.departure,
                start_location: location,
                end_location: location,
                start_address: address.clone(),
                end_address: address,
                distance_miles: 0.0,
                remark: Some(remark.to_string()),
                related_stop: Some(stop.sequence),
            });
        }
        self.cursor = departure;
        self.sequence += 1;
        self.stops.push(stop);
    }
}

/// Plan a trip over already-resolved route legs.
///
/// Infeasibility does not fail the call; the returned plan carries the
/// feasibility report and the caller decides what to do with it.
pub fn plan_trip(
    trip_id: &str,
    departure: DateTime<Utc>,
    legs: &[RouteLeg],
    snapshot: Option<&CycleSnapshot>,
    rules: &HosRules,
) -> Result<TripPlan, PlanError> {
    if legs.is_empty() {
        return Err(PlanError::EmptyRoute);
    }
    for (index, leg) in legs.iter().enumerate() {
        if leg.distance_miles <= 0.0 || leg.duration_hours <= 0.0 {
            return Err(PlanError::InvalidLeg(index));
        }
    }

    let driving_hours: f64 = legs.iter().map(|l| l.duration_hours).sum();
    let trip = TripParams {
        trip_id: trip_id.to_string(),
        departure,
        leg_duration_hours: legs.iter().map(|l| l.duration_hours).collect(),
        distance_miles: legs.iter().map(|l| l.distance_miles).sum(),
    };
    let feasibility = compliance::feasibility(&trip, driving_hours, snapshot, rules);

    let mut state = PlannerState {
        continuous_driving_hours: snapshot
            .and_then(|s| s.continuous_driving_since)
            .map(|since| ((departure - since).num_milliseconds() as f64 / 3_600_000.0).max(0.0))
            .unwrap_or(0.0),
        today_driving_hours: snapshot.map(|s| s.today_driving_hours.max(0.0)).unwrap_or(0.0),
        today_on_duty_hours: snapshot.map(|s| s.today_on_duty_hours.max(0.0)).unwrap_or(0.0),
    };

    let mut builder = ScheduleBuilder::new(departure);

    // Pre-trip break: only before the first leg, and only when the driver
    // arrives at the wheel already past the continuous-driving threshold.
    if feasibility.immediate_break_required {
        let first = &legs[0];
        builder.push_stop(
            StopType::MandatoryBreak,
            first.origin,
            first.origin_address.clone(),
            0.0,
            rules.min_break_hours,
            "Pre-trip break",
        );
        state.continuous_driving_hours = 0.0;
    }

    let mut trip_distance = 0.0_f64;
    for leg in legs {
        let candidates = leg_candidates(leg, trip_distance, state, rules);
        let merged = merge_candidates(candidates, rules.merge_buffer_miles);
        walk_leg(leg, merged, trip_distance, &mut state, &mut builder, rules);
        trip_distance += leg.distance_miles;
    }

    let compliance = compliance::score_and_report(&builder.periods, snapshot, rules);

    Ok(TripPlan {
        completion: builder.cursor,
        stops: builder.stops,
        periods: builder.periods,
        feasibility,
        compliance,
        departure,
        total_distance_miles: trip_distance,
    })
}

/// Generate fuel, break, and reset candidates for one leg, positioned by
/// driving time into the leg. Fuel and break candidates are generated
/// independently and merged afterwards.
fn leg_candidates(
    leg: &RouteLeg,
    trip_distance_before: f64,
    state: PlannerState,
    rules: &HosRules,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    // Fuel: at every multiple of the fuel cadence in cumulative trip miles.
    let cadence = rules.max_fuel_distance_miles;
    let mut next_fuel = (trip_distance_before / cadence).floor() * cadence + cadence;
    while next_fuel < trip_distance_before + leg.distance_miles {
        let miles_into_leg = next_fuel - trip_distance_before;
        candidates.push(Candidate {
            stop_type: StopType::Fuel,
            offset_hours: miles_into_leg / leg.distance_miles * leg.duration_hours,
            distance_miles: miles_into_leg,
            duration_hours: rules.fuel_stop_hours,
        });
        next_fuel += cadence;
    }

    // Breaks: wherever continuous driving would cross the threshold,
    // interpolated linearly against the leg's duration.
    let mut continuous = state.continuous_driving_hours;
    let mut offset = 0.0_f64;
    loop {
        let until_break = (rules.max_continuous_driving_hours - continuous).max(0.0);
        if offset + until_break >= leg.duration_hours - EPSILON_HOURS {
            break;
        }
        offset += until_break;
        candidates.push(Candidate {
            stop_type: StopType::MandatoryBreak,
            offset_hours: offset,
            distance_miles: offset / leg.duration_hours * leg.distance_miles,
            duration_hours: rules.min_break_hours,
        });
        continuous = 0.0;
    }

    // Daily reset: when this leg's projection would blow the driving cap or
    // the on-duty window. Parked no later than the configured late-leg
    // proportion, and never past the point where the budget actually runs
    // out.
    let dwell = dwell_hours(leg.kind, rules);
    let projected_driving = state.today_driving_hours + leg.duration_hours;
    let projected_on_duty = state.today_on_duty_hours + leg.duration_hours + dwell;
    if projected_driving > rules.max_daily_driving_hours
        || projected_on_duty > rules.max_daily_on_duty_hours
    {
        let until_driving_cap =
            (rules.max_daily_driving_hours - state.today_driving_hours).max(0.0);
        let until_window = (rules.max_daily_on_duty_hours - state.today_on_duty_hours).max(0.0);
        let offset = (rules.reset_leg_proportion * leg.duration_hours)
            .min(until_driving_cap)
            .min(until_window);
        candidates.push(Candidate {
            stop_type: StopType::DailyReset,
            offset_hours: offset,
            distance_miles: offset / leg.duration_hours * leg.distance_miles,
            duration_hours: rules.min_off_duty_hours,
        });
    }

    candidates
}

/// Sort candidates by distance and merge fuel/break pairs closer than the
/// buffer into a single combined stop. The longer duration wins and the
/// compliance purpose is kept.
fn merge_candidates(mut candidates: Vec<Candidate>, buffer_miles: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| a.distance_miles.total_cmp(&b.distance_miles));

    let mut merged: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if let Some(last) = merged.last_mut() {
            let close = (candidate.distance_miles - last.distance_miles).abs() < buffer_miles;
            let fuel_break_pair = matches!(
                (last.stop_type, candidate.stop_type),
                (StopType::Fuel, StopType::MandatoryBreak)
                    | (StopType::MandatoryBreak, StopType::Fuel)
            );
            if close && fuel_break_pair {
                debug!(miles = last.distance_miles, "combining fuel and break into one stop");
                last.stop_type = StopType::FuelAndBreak;
                last.duration_hours = last.duration_hours.max(candidate.duration_hours);
                continue;
            }
        }
        merged.push(candidate);
    }
    merged
}

fn walk_leg(
    leg: &RouteLeg,
    candidates: Vec<Candidate>,
    trip_distance_before: f64,
    state: &mut PlannerState,
    builder: &mut ScheduleBuilder,
    rules: &HosRules,
) {
    let mut prev_offset = 0.0_f64;
    let mut prev_distance = 0.0_f64;
    let mut prev_location = leg.origin;
    let mut prev_address = leg.origin_address.clone();

    for candidate in candidates {
        let location = interpolate_position(leg, candidate.offset_hours / leg.duration_hours);
        let address = format!("{:.4}, {:.4}", location.0, location.1);

        builder.push_driving(
            prev_location,
            &prev_address,
            location,
            &address,
            candidate.offset_hours - prev_offset,
            candidate.distance_miles - prev_distance,
        );
        apply_driving(state, candidate.offset_hours - prev_offset);

        builder.push_stop(
            candidate.stop_type,
            location,
            address.clone(),
            trip_distance_before + candidate.distance_miles,
            candidate.duration_hours,
            stop_remark(candidate.stop_type),
        );
        apply_stop(state, candidate.stop_type, candidate.duration_hours, rules);

        prev_offset = candidate.offset_hours;
        prev_distance = candidate.distance_miles;
        prev_location = location;
        prev_address = address;
    }

    // Close the leg: the remaining driving stretch, then the terminal stop.
    builder.push_driving(
        prev_location,
        &prev_address,
        leg.destination,
        &leg.destination_address,
        leg.duration_hours - prev_offset,
        leg.distance_miles - prev_distance,
    );
    apply_driving(state, leg.duration_hours - prev_offset);

    let terminal = leg.kind.terminal_stop();
    let dwell = dwell_hours(leg.kind, rules);
    builder.push_stop(
        terminal,
        leg.destination,
        leg.destination_address.clone(),
        trip_distance_before + leg.distance_miles,
        dwell,
        stop_remark(terminal),
    );
    apply_stop(state, terminal, dwell, rules);
}

fn apply_driving(state: &mut PlannerState, hours: f64) {
    if hours <= 0.0 {
        return;
    }
    state.continuous_driving_hours += hours;
    state.today_driving_hours += hours;
    state.today_on_duty_hours += hours;
}

fn apply_stop(state: &mut PlannerState, stop_type: StopType, duration_hours: f64, rules: &HosRules) {
    match stop_type.duty_status() {
        DutyStatus::SleeperBerth if duration_hours >= rules.min_off_duty_hours => {
            // A full daily rest restores the day's budgets.
            state.continuous_driving_hours = 0.0;
            state.today_driving_hours = 0.0;
            state.today_on_duty_hours = 0.0;
        }
        status if status.is_rest() && duration_hours >= rules.min_break_hours => {
            state.continuous_driving_hours = 0.0;
        }
        DutyStatus::OnDutyNotDriving => {
            state.today_on_duty_hours += duration_hours;
        }
        _ => {}
    }
}

fn dwell_hours(kind: LegKind, rules: &HosRules) -> f64 {
    match kind {
        LegKind::ToPickup => rules.pickup_dwell_hours,
        LegKind::ToDelivery => rules.delivery_dwell_hours,
    }
}

fn stop_remark(stop_type: StopType) -> &'static str {
    match stop_type {
        StopType::Pickup => "Pickup - loading",
        StopType::Delivery => "Delivery - unloading",
        StopType::Fuel => "Fuel stop",
        StopType::MandatoryBreak => "Mandatory break",
        StopType::DailyReset => "Daily reset",
        StopType::Rest => "Rest stop",
        StopType::FuelAndBreak => "Fuel and mandatory break",
    }
}

/// Position along a leg at the given time proportion.
///
/// With three or more waypoints the route geometry guides the estimate;
/// otherwise it falls back to straight-line interpolation between the leg's
/// endpoints.
pub fn interpolate_position(leg: &RouteLeg, proportion: f64) -> (f64, f64) {
    let t = proportion.clamp(0.0, 1.0);
    if leg.waypoints.len() >= 3 {
        let scaled = t * (leg.waypoints.len() - 1) as f64;
        let index = (scaled.floor() as usize).min(leg.waypoints.len() - 2);
        let fraction = scaled - index as f64;
        let a = leg.waypoints[index];
        let b = leg.waypoints[index + 1];
        (a.0 + (b.0 - a.0) * fraction, a.1 + (b.1 - a.1) * fraction)
    } else {
        (
            leg.origin.0 + (leg.destination.0 - leg.origin.0) * t,
            leg.origin.1 + (leg.destination.1 - leg.origin.1) * t,
        )
    }
}

/// Outcome of [`optimize_plan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeOutcome {
    /// True only when the stop count actually dropped without growing the
    /// violation list.
    pub improved: bool,
    pub merged_stops: usize,
    pub plan: TripPlan,
}

/// Try to reduce stop count by combining adjacent, spatially close fuel and
/// break stops that synthesis left separate.
///
/// Idempotent: a second pass over an optimized plan finds nothing to merge
/// and reports no improvement. When nothing merges, or the re-validated
/// violation list grows, the original plan is returned unchanged.
pub fn optimize_plan(
    plan: &TripPlan,
    snapshot: Option<&CycleSnapshot>,
    rules: &HosRules,
) -> OptimizeOutcome {
    let mut stops = plan.stops.clone();
    let mut periods = plan.periods.clone();
    let mut merged_count = 0;

    loop {
        let Some(index) = (0..stops.len().saturating_sub(1))
            .find(|&i| stop::mergeable(&stops[i], &stops[i + 1], rules.merge_buffer_miles))
        else {
            break;
        };

        let removed = stops.remove(index + 1);
        let kept = &mut stops[index];
        let combined = kept.duration_hours.max(removed.duration_hours);
        debug!(
            kept = kept.sequence,
            removed = removed.sequence,
            "optimizer combining fuel and break stops"
        );

        kept.stop_type = StopType::FuelAndBreak;
        kept.duration_hours = combined;
        kept.required_for_compliance = true;
        let kept_sequence = kept.sequence;

        // The removed stop's dwell disappears; the driving between the two
        // stops stays. Relay the timeline from the departure, keeping every
        // other period's length.
        periods.retain(|p| p.related_stop != Some(removed.sequence));
        let mut cursor = plan.departure;
        for period in periods.iter_mut() {
            let hours = if period.related_stop == Some(kept_sequence) {
                combined
            } else {
                period.duration_hours()
            };
            period.start = cursor;
            period.end = cursor + duty::hours(hours);
            cursor = period.end;
        }
        for stop in stops.iter_mut() {
            if let Some(period) = periods.iter().find(|p| p.related_stop == Some(stop.sequence)) {
                stop.arrival = period.start;
                stop.departure = period.end;
            }
        }
        merged_count += 1;
    }

    if merged_count == 0 {
        debug!("optimization pass found no improvement");
        return OptimizeOutcome {
            improved: false,
            merged_stops: 0,
            plan: plan.clone(),
        };
    }

    // Reassign contiguous sequence numbers and remap period references.
    let mut remap = HashMap::new();
    for (index, stop) in stops.iter_mut().enumerate() {
        let new_sequence = index as u32 + 1;
        remap.insert(stop.sequence, new_sequence);
        stop.sequence = new_sequence;
    }
    for period in periods.iter_mut() {
        if let Some(old) = period.related_stop {
            period.related_stop = remap.get(&old).copied();
        }
    }

    let compliance = compliance::score_and_report(&periods, snapshot, rules);
    let improved = stops.len() < plan.stops.len()
        && compliance.violations.len() <= plan.compliance.violations.len();
    if !improved {
        debug!("optimization pass found no improvement");
        return OptimizeOutcome {
            improved: false,
            merged_stops: 0,
            plan: plan.clone(),
        };
    }

    let mut optimized = plan.clone();
    optimized.completion = periods.last().map(|p| p.end).unwrap_or(plan.completion);
    optimized.stops = stops;
    optimized.periods = periods;
    optimized.compliance = compliance;

    OptimizeOutcome {
        improved: true,
        merged_stops: merged_count,
        plan: optimized,
    }
}
