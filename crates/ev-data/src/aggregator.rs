//! Charging-session aggregation over days, months and weekdays.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDateTime, Weekday};
use ev_core::models::{weekday_label, ChargingSession};
use serde::Serialize;

// ── AggregatedStats ───────────────────────────────────────────────────────────

/// Totals accumulated across multiple sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedStats {
    pub sessions: u32,
    pub total_energy: f64,
    /// Sum of session durations in minutes.
    pub total_duration_minutes: f64,
    #[serde(skip)]
    start_hours_sum: f64,
    #[serde(skip)]
    end_hours_sum: f64,
}

impl AggregatedStats {
    pub fn add_session(&mut self, session: &ChargingSession) {
        self.sessions += 1;
        self.total_energy += session.total_energy();
        self.total_duration_minutes += session.duration_minutes();
        self.start_hours_sum += session.start_time_of_day();
        self.end_hours_sum += session.end_time_of_day();
    }

    fn merge(&mut self, other: &AggregatedStats) {
        self.sessions += other.sessions;
        self.total_energy += other.total_energy;
        self.total_duration_minutes += other.total_duration_minutes;
        self.start_hours_sum += other.start_hours_sum;
        self.end_hours_sum += other.end_hours_sum;
    }

    /// Mean energy per session, `0.0` without sessions.
    pub fn mean_energy(&self) -> f64 {
        self.per_session(self.total_energy)
    }

    pub fn mean_duration_minutes(&self) -> f64 {
        self.per_session(self.total_duration_minutes)
    }

    /// Mean start time of day in fractional hours.
    pub fn mean_start_hour(&self) -> f64 {
        self.per_session(self.start_hours_sum)
    }

    /// Mean end time of day in fractional hours.
    pub fn mean_end_hour(&self) -> f64 {
        self.per_session(self.end_hours_sum)
    }

    fn per_session(&self, total: f64) -> f64 {
        if self.sessions == 0 {
            0.0
        } else {
            total / self.sessions as f64
        }
    }
}

// ── AggregatedPeriod ──────────────────────────────────────────────────────────

/// All sessions starting within one period (a day, a month or a weekday).
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedPeriod {
    /// `"2023-01-15"` (daily), `"2023-01"` (monthly) or `"Mon"` (weekday).
    pub period_key: String,
    pub stats: AggregatedStats,
    /// Distinct vehicle ids seen in this period.
    pub users: BTreeSet<String>,
}

impl AggregatedPeriod {
    fn new(period_key: impl Into<String>) -> Self {
        Self {
            period_key: period_key.into(),
            stats: AggregatedStats::default(),
            users: BTreeSet::new(),
        }
    }

    fn add_session(&mut self, session: &ChargingSession) {
        self.stats.add_session(session);
        if !self.users.contains(session.ev_id()) {
            self.users.insert(session.ev_id().to_string());
        }
    }

    pub fn distinct_users(&self) -> usize {
        self.users.len()
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

// ── SessionAggregator ─────────────────────────────────────────────────────────

/// Stateless helper that groups sessions by the period of their start time.
pub struct SessionAggregator;

impl SessionAggregator {
    /// Group by calendar day (`%Y-%m-%d`), sorted ascending.
    pub fn aggregate_daily(sessions: &[ChargingSession]) -> Vec<AggregatedPeriod> {
        Self::aggregate_by_period(sessions, |ts| ts.format("%Y-%m-%d").to_string())
    }

    /// Group by calendar month (`%Y-%m`), sorted ascending.
    pub fn aggregate_monthly(sessions: &[ChargingSession]) -> Vec<AggregatedPeriod> {
        Self::aggregate_by_period(sessions, |ts| ts.format("%Y-%m").to_string())
    }

    /// Group by weekday, always returning seven periods from Mon to Sun.
    pub fn aggregate_by_weekday(sessions: &[ChargingSession]) -> Vec<AggregatedPeriod> {
        let mut by_day: Vec<AggregatedPeriod> = WEEK
            .iter()
            .map(|day| AggregatedPeriod::new(weekday_label(*day)))
            .collect();

        for session in sessions {
            let idx = session.start_time().weekday().num_days_from_monday() as usize;
            by_day[idx].add_session(session);
        }
        by_day
    }

    /// Sum the stats of all periods.
    pub fn calculate_totals(periods: &[AggregatedPeriod]) -> AggregatedStats {
        let mut totals = AggregatedStats::default();
        for period in periods {
            totals.merge(&period.stats);
        }
        totals
    }

    // ── Private ───────────────────────────────────────────────────────────────

    fn aggregate_by_period(
        sessions: &[ChargingSession],
        key_fn: impl Fn(NaiveDateTime) -> String,
    ) -> Vec<AggregatedPeriod> {
        let mut map: BTreeMap<String, AggregatedPeriod> = BTreeMap::new();

        for session in sessions {
            let key = key_fn(session.start_time());
            map.entry(key.clone())
                .or_insert_with(|| AggregatedPeriod::new(key))
                .add_session(session);
        }

        map.into_values().collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
