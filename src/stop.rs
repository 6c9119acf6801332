//! Physical stops along a planned trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duty::DutyStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopType {
    Pickup,
    Delivery,
    Fuel,
    MandatoryBreak,
    DailyReset,
    Rest,
    /// A fuel stop and a mandatory break combined into one stop.
    FuelAndBreak,
}

impl StopType {
    /// Duty status a driver logs while at a stop of this type.
    pub fn duty_status(self) -> DutyStatus {
        match self {
            StopType::Pickup | StopType::Delivery => DutyStatus::OnDutyNotDriving,
            StopType::Fuel | StopType::MandatoryBreak | StopType::Rest | StopType::FuelAndBreak => {
                DutyStatus::OffDuty
            }
            StopType::DailyReset => DutyStatus::SleeperBerth,
        }
    }

    /// Whether stops of this type exist to satisfy a regulation.
    pub fn required_for_compliance(self) -> bool {
        matches!(
            self,
            StopType::MandatoryBreak | StopType::DailyReset | StopType::FuelAndBreak
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            StopType::Pickup => "pickup",
            StopType::Delivery => "delivery",
            StopType::Fuel => "fuel",
            StopType::MandatoryBreak => "mandatory_break",
            StopType::DailyReset => "daily_reset",
            StopType::Rest => "rest",
            StopType::FuelAndBreak => "fuel_and_break",
        }
    }
}

/// A point along the route where the truck stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Strictly increasing, unique within a trip.
    pub sequence: u32,
    pub stop_type: StopType,
    pub location: (f64, f64),
    pub address: String,
    /// Non-decreasing across the stop sequence.
    pub distance_from_origin_miles: f64,
    pub arrival: DateTime<Utc>,
    pub departure: DateTime<Utc>,
    pub duration_hours: f64,
    pub required_for_compliance: bool,
}

/// Whether two adjacent stops are a fuel/break pair close enough to combine.
pub fn mergeable(a: &Stop, b: &Stop, buffer_miles: f64) -> bool {
    let fuel_break_pair = matches!(
        (a.stop_type, b.stop_type),
        (StopType::Fuel, StopType::MandatoryBreak) | (StopType::MandatoryBreak, StopType::Fuel)
    );
    fuel_break_pair
        && (b.distance_from_origin_miles - a.distance_from_origin_miles).abs() < buffer_miles
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stop(sequence: u32, stop_type: StopType, distance: f64) -> Stop {
        let arrival = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        Stop {
            sequence,
            stop_type,
            location: (36.1, -115.1),
            address: String::new(),
            distance_from_origin_miles: distance,
            arrival,
            departure: arrival,
            duration_hours: 0.5,
            required_for_compliance: stop_type.required_for_compliance(),
        }
    }

    #[test]
    fn test_duty_status_mapping() {
        assert_eq!(StopType::Pickup.duty_status(), DutyStatus::OnDutyNotDriving);
        assert_eq!(StopType::Delivery.duty_status(), DutyStatus::OnDutyNotDriving);
        assert_eq!(StopType::Fuel.duty_status(), DutyStatus::OffDuty);
        assert_eq!(StopType::MandatoryBreak.duty_status(), DutyStatus::OffDuty);
        assert_eq!(StopType::DailyReset.duty_status(), DutyStatus::SleeperBerth);
    }

    #[test]
    fn test_mergeable_fuel_break_pair() {
        let fuel = stop(1, StopType::Fuel, 500.0);
        let close_break = stop(2, StopType::MandatoryBreak, 530.0);
        let far_break = stop(2, StopType::MandatoryBreak, 560.0);

        assert!(mergeable(&fuel, &close_break, 50.0));
        assert!(mergeable(&close_break, &fuel, 50.0));
        assert!(!mergeable(&fuel, &far_break, 50.0));
    }

    #[test]
    fn test_not_mergeable_other_types() {
        let pickup = stop(1, StopType::Pickup, 500.0);
        let break_stop = stop(2, StopType::MandatoryBreak, 505.0);
        assert!(!mergeable(&pickup, &break_stop, 50.0));
    }
}
