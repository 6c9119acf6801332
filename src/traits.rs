//! Seam traits for external collaborators.
//!
//! The scheduling core never fetches routes, persists state, or caches
//! results itself. Callers supply these behaviors; the crate ships an
//! in-memory implementation of each for single-process use and tests.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::compliance::FeasibilityReport;
use crate::cycle::CycleState;
use crate::route::{RouteError, RouteEstimate};

/// Resolves distance, duration, and route geometry between two coordinates.
///
/// A failed resolution is a hard error for the leg in question; the planner
/// never guesses a distance.
pub trait RouteProvider {
    fn route_between(
        &self,
        from: (f64, f64),
        to: (f64, f64),
    ) -> Result<RouteEstimate, RouteError>;
}

/// Per-driver cycle state with serialized read-modify-write updates.
///
/// Concurrent trip completions for one driver must not interleave, so every
/// mutation runs inside `with_state` while the store holds that driver's
/// entry exclusively. State is created lazily with zero accumulated hours
/// and rolled over to `now` before the closure runs.
pub trait CycleStateStore {
    fn with_state<T>(
        &self,
        driver_id: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut CycleState) -> T,
    ) -> T;
}

/// TTL key-value cache for feasibility results.
///
/// Entries may be served stale within their TTL; inputs that hash to the
/// same key are assumed to produce identical feasibility outcomes.
pub trait FeasibilityCache {
    fn get(&self, key: u64) -> Option<FeasibilityReport>;
    fn put(&self, key: u64, report: FeasibilityReport, ttl: Duration);
}
