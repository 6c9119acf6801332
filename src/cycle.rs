//! Rolling per-driver HOS cycle state.
//!
//! One `CycleState` exists per driver for the life of the driver. It is
//! mutated only by manual status changes, trip-completion absorption, and
//! the daily rollover; persistence belongs to the caller.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HosRules;
use crate::duty::{DutyPeriod, DutyStatus};
use crate::logbook;
use crate::traits::CycleStateStore;

/// Archived totals for one completed day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub driving_hours: f64,
    pub on_duty_hours: f64,
}

/// Boundary snapshot of a driver's state for feasibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleSnapshot {
    pub total_cycle_hours: f64,
    pub today_driving_hours: f64,
    pub today_on_duty_hours: f64,
    pub current_duty_status: DutyStatus,
    pub current_status_start: DateTime<Utc>,
    pub continuous_driving_since: Option<DateTime<Utc>>,
    pub last_break_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleState {
    pub driver_id: String,
    /// First date of the rolling window.
    pub cycle_start: NaiveDate,
    /// On-duty hours used inside the rolling window, today included.
    pub cycle_used_hours: f64,
    pub current_date: NaiveDate,
    pub today_driving_hours: f64,
    pub today_on_duty_hours: f64,
    pub current_status: DutyStatus,
    pub status_since: DateTime<Utc>,
    pub last_break_end: Option<DateTime<Utc>>,
    /// Set while a continuous driving stretch is open; cleared by any
    /// qualifying break.
    pub continuous_driving_since: Option<DateTime<Utc>>,
    /// Per-day history inside the rolling window, oldest first.
    pub history: Vec<DailyTotals>,
}

impl CycleState {
    /// Fresh state with zero accumulated hours.
    pub fn new(driver_id: impl Into<String>, now: DateTime<Utc>, rules: &HosRules) -> Self {
        let today = now.date_naive();
        Self {
            driver_id: driver_id.into(),
            cycle_start: today - Duration::days(rules.cycle_days as i64 - 1),
            cycle_used_hours: 0.0,
            current_date: today,
            today_driving_hours: 0.0,
            today_on_duty_hours: 0.0,
            current_status: DutyStatus::OffDuty,
            status_since: now,
            last_break_end: None,
            continuous_driving_since: None,
            history: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> CycleSnapshot {
        CycleSnapshot {
            total_cycle_hours: self.cycle_used_hours,
            today_driving_hours: self.today_driving_hours,
            today_on_duty_hours: self.today_on_duty_hours,
            current_duty_status: self.current_status,
            current_status_start: self.status_since,
            continuous_driving_since: self.continuous_driving_since,
            last_break_end: self.last_break_end,
        }
    }

    /// Manual duty-status change at `at`, closing the current status period.
    pub fn set_status(&mut self, status: DutyStatus, at: DateTime<Utc>, rules: &HosRules) {
        self.rollover(at.date_naive(), rules);
        self.account(self.current_status, self.status_since, at, rules);
        if status == DutyStatus::Driving && self.continuous_driving_since.is_none() {
            self.continuous_driving_since = Some(at);
        }
        self.current_status = status;
        self.status_since = at;
    }

    /// Fold a completed trip's periods into the rolling totals.
    pub fn absorb_trip(&mut self, periods: &[DutyPeriod], rules: &HosRules) {
        let mut split = logbook::split_at_midnight(periods, rules.split_distance_rule);
        split.sort_by_key(|p| p.start);
        for period in &split {
            self.rollover(period.start.date_naive(), rules);
            if period.status == DutyStatus::Driving && self.continuous_driving_since.is_none() {
                self.continuous_driving_since = Some(period.start);
            }
            self.account(period.status, period.start, period.end, rules);
        }
        if let Some(last) = split.last() {
            self.current_status = last.status;
            self.status_since = last.start;
        }
    }

    /// Archive prior days and zero today's counters when the date advances.
    pub fn rollover(&mut self, today: NaiveDate, rules: &HosRules) {
        if today <= self.current_date {
            return;
        }
        debug!(driver = %self.driver_id, %today, "daily rollover");
        self.history.push(DailyTotals {
            date: self.current_date,
            driving_hours: self.today_driving_hours,
            on_duty_hours: self.today_on_duty_hours,
        });
        self.today_driving_hours = 0.0;
        self.today_on_duty_hours = 0.0;
        self.current_date = today;
        self.cycle_start = today - Duration::days(rules.cycle_days as i64 - 1);
        self.history.retain(|day| day.date >= self.cycle_start);
        self.cycle_used_hours = self.history.iter().map(|day| day.on_duty_hours).sum();
    }

    fn account(
        &mut self,
        status: DutyStatus,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        rules: &HosRules,
    ) {
        let hours = span_hours(from, to);
        if hours <= 0.0 {
            return;
        }
        match status {
            DutyStatus::Driving => {
                self.today_driving_hours += hours;
                self.today_on_duty_hours += hours;
                self.cycle_used_hours += hours;
            }
            DutyStatus::OnDutyNotDriving => {
                self.today_on_duty_hours += hours;
                self.cycle_used_hours += hours;
            }
            DutyStatus::OffDuty | DutyStatus::SleeperBerth => {
                if hours >= rules.min_break_hours {
                    self.last_break_end = Some(to);
                    self.continuous_driving_since = None;
                }
            }
        }
    }
}

fn span_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds() as f64 / 3_600_000.0).max(0.0)
}

/// In-memory `CycleStateStore`.
///
/// One lock guards the whole map, which serializes per-driver updates in a
/// single process. State is created lazily with zero hours on first use and
/// rolled over to the caller's clock before every access.
#[derive(Debug, Default)]
pub struct InMemoryCycleStore {
    rules: HosRules,
    states: Mutex<HashMap<String, CycleState>>,
}

impl InMemoryCycleStore {
    pub fn new(rules: HosRules) -> Self {
        Self {
            rules,
            states: Mutex::new(HashMap::new()),
        }
    }
}

impl CycleStateStore for InMemoryCycleStore {
    fn with_state<T>(
        &self,
        driver_id: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut CycleState) -> T,
    ) -> T {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let state = states
            .entry(driver_id.to_string())
            .or_insert_with(|| CycleState::new(driver_id, now, &self.rules));
        state.rollover(now.date_naive(), &self.rules);
        f(state)
    }
}
