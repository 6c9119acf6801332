//! TTL memoization for feasibility results.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::compliance::{self, FeasibilityReport, TripParams};
use crate::config::HosRules;
use crate::cycle::CycleSnapshot;
use crate::traits::FeasibilityCache;

/// Deterministic key over the fields that decide a feasibility outcome:
/// trip id, departure, leg durations, estimated driving hours, and the fuel
/// cadence in effect.
pub fn cache_key(trip: &TripParams, estimated_driving_hours: f64, rules: &HosRules) -> u64 {
    let mut hasher = DefaultHasher::new();
    trip.trip_id.hash(&mut hasher);
    trip.departure.timestamp_millis().hash(&mut hasher);
    for duration in &trip.leg_duration_hours {
        duration.to_bits().hash(&mut hasher);
    }
    trip.distance_miles.to_bits().hash(&mut hasher);
    estimated_driving_hours.to_bits().hash(&mut hasher);
    rules.max_fuel_distance_miles.to_bits().hash(&mut hasher);
    hasher.finish()
}

/// Feasibility with memoization.
///
/// The snapshot is deliberately outside the key: within the TTL window a
/// stale-but-recent answer is acceptable.
pub fn cached_feasibility(
    cache: &impl FeasibilityCache,
    trip: &TripParams,
    estimated_driving_hours: f64,
    snapshot: Option<&CycleSnapshot>,
    rules: &HosRules,
    ttl: Duration,
) -> FeasibilityReport {
    let key = cache_key(trip, estimated_driving_hours, rules);
    if let Some(report) = cache.get(key) {
        return report;
    }
    let report = compliance::feasibility(trip, estimated_driving_hours, snapshot, rules);
    cache.put(key, report.clone(), ttl);
    report
}

/// In-memory TTL cache. Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct InMemoryTtlCache {
    entries: Mutex<HashMap<u64, (Instant, FeasibilityReport)>>,
}

impl InMemoryTtlCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeasibilityCache for InMemoryTtlCache {
    fn get(&self, key: u64) -> Option<FeasibilityReport> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((expires, report)) = entries.get(&key) {
            if Instant::now() < *expires {
                return Some(report.clone());
            }
        } else {
            return None;
        }
        entries.remove(&key);
        None
    }

    fn put(&self, key: u64, report: FeasibilityReport, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, (Instant::now() + ttl, report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    fn trip(id: &str) -> TripParams {
        TripParams {
            trip_id: id.to_string(),
            departure: Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap(),
            leg_duration_hours: vec![2.0, 5.5],
            distance_miles: 400.0,
        }
    }

    #[test]
    fn test_key_is_deterministic() {
        let rules = HosRules::default();
        assert_eq!(
            cache_key(&trip("t1"), 7.5, &rules),
            cache_key(&trip("t1"), 7.5, &rules)
        );
    }

    #[test]
    fn test_key_varies_with_semantic_fields() {
        let rules = HosRules::default();
        let base = cache_key(&trip("t1"), 7.5, &rules);
        assert_ne!(base, cache_key(&trip("t2"), 7.5, &rules));
        assert_ne!(base, cache_key(&trip("t1"), 8.0, &rules));

        let mut other_rules = HosRules::default();
        other_rules.max_fuel_distance_miles = 500.0;
        assert_ne!(base, cache_key(&trip("t1"), 7.5, &other_rules));
    }

    #[test]
    fn test_cached_feasibility_hits() {
        let rules = HosRules::default();
        let cache = InMemoryTtlCache::new();
        let params = trip("t1");

        let first = cached_feasibility(&cache, &params, 7.5, None, &rules, Duration::from_secs(60));
        let second = cached_feasibility(&cache, &params, 7.5, None, &rules, Duration::from_secs(60));
        assert_eq!(first, second);
        assert!(first.is_feasible);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let rules = HosRules::default();
        let cache = InMemoryTtlCache::new();
        let params = trip("t1");
        let key = cache_key(&params, 7.5, &rules);

        let report = compliance::feasibility(&params, 7.5, None, &rules);
        cache.put(key, report, Duration::ZERO);
        assert!(cache.get(key).is_none());
    }
}
