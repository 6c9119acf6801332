//! Regulatory and planner configuration.
//!
//! Every numeric limit is injectable so alternate duty-cycle rulesets can be
//! supported. Defaults are the US federal property-carrying values.

use serde::{Deserialize, Serialize};

/// How traveled miles are attributed when a driving period is split at
/// midnight.
///
/// `FirstHalf` keeps all miles on the pre-midnight half; distance bookkeeping
/// elsewhere in the system is leg-relative, not period-relative, so the
/// second half reports zero additional distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitDistanceRule {
    FirstHalf,
    Proportional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HosRules {
    /// Maximum driving hours per duty day.
    pub max_daily_driving_hours: f64,
    /// Maximum on-duty hours per duty day (the 14-hour window).
    pub max_daily_on_duty_hours: f64,
    /// Minimum off-duty hours for a daily reset.
    pub min_off_duty_hours: f64,
    /// Continuous driving allowed before a break is due.
    pub max_continuous_driving_hours: f64,
    /// Minimum duration for a rest period to count as a break.
    pub min_break_hours: f64,
    /// On-duty budget for the rolling cycle.
    pub max_cycle_hours: f64,
    /// Length of the rolling cycle in days.
    pub cycle_days: u32,
    /// Daily log grid step.
    pub grid_resolution_minutes: u32,
    /// A fuel stop is scheduled at every multiple of this trip distance.
    pub max_fuel_distance_miles: f64,
    /// Fuel and break stops closer than this are combined into one stop.
    pub merge_buffer_miles: f64,
    pub pickup_dwell_hours: f64,
    pub delivery_dwell_hours: f64,
    pub fuel_stop_hours: f64,
    /// Latest position within a leg, as a proportion of its duration, where
    /// a daily reset may be parked.
    pub reset_leg_proportion: f64,
    pub split_distance_rule: SplitDistanceRule,
}

impl Default for HosRules {
    fn default() -> Self {
        Self {
            max_daily_driving_hours: 11.0,
            max_daily_on_duty_hours: 14.0,
            min_off_duty_hours: 10.0,
            max_continuous_driving_hours: 8.0,
            min_break_hours: 0.5,
            max_cycle_hours: 70.0,
            cycle_days: 8,
            grid_resolution_minutes: 15,
            max_fuel_distance_miles: 1000.0,
            merge_buffer_miles: 50.0,
            pickup_dwell_hours: 1.0,
            delivery_dwell_hours: 1.0,
            fuel_stop_hours: 0.5,
            reset_leg_proportion: 0.8,
            split_distance_rule: SplitDistanceRule::FirstHalf,
        }
    }
}

impl HosRules {
    pub fn grid_points_per_day(&self) -> usize {
        (24 * 60 / self.grid_resolution_minutes) as usize
    }
}
