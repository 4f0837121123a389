//! Exploratory analysis of normalized charging sessions.
//!
//! [`analyze_sessions`] computes every statistic the reports need in one pass
//! over the sessions and returns a serializable [`AnalysisResult`].

use chrono::Utc;
use ev_core::models::{month_label, weekday_label, ChargingSession};
use ev_core::stats::{histogram, BoxStats, CorrelationMatrix, HistogramBin, Summary};
use serde::Serialize;
use tracing::debug;

use crate::aggregator::SessionAggregator;
use crate::engagement::Engagement;

/// Histogram bins used when the caller has no preference.
pub const DEFAULT_BINS: usize = 24;

// ── Public types ──────────────────────────────────────────────────────────────

/// Metadata produced alongside the analysis result.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    /// RFC 3339 timestamp when this result was generated.
    pub generated_at: String,
    pub sessions: usize,
    pub users: usize,
    /// Earliest session start, canonical format.
    pub first_start: Option<String>,
    /// Latest session end, canonical format.
    pub last_end: Option<String>,
    /// Calendar days with at least one session start.
    pub active_days: usize,
    pub total_energy: f64,
    pub analysis_time_seconds: f64,
}

/// Summary and histogram of one numeric session variable.
#[derive(Debug, Clone, Serialize)]
pub struct VariableDistribution {
    pub name: String,
    pub unit: &'static str,
    pub summary: Summary,
    pub histogram: Vec<HistogramBin>,
}

/// Number and share of sessions in one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub label: String,
    pub sessions: usize,
    pub share: f64,
}

/// Box statistics of the time variables within one group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupBoxStats {
    pub group: String,
    pub start_time: BoxStats,
    pub end_time: BoxStats,
    pub duration: BoxStats,
}

/// Per-day activity.
#[derive(Debug, Clone, Serialize)]
pub struct DailyStats {
    pub days: usize,
    pub sessions_per_day: Summary,
    pub energy_per_day: Summary,
    pub users_per_day: Summary,
}

/// The complete output of [`analyze_sessions`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub metadata: AnalysisMetadata,
    /// Start time, end time, duration, energy and average power.
    pub variables: Vec<VariableDistribution>,
    pub by_month: Vec<CategoryCount>,
    pub by_weekday: Vec<CategoryCount>,
    pub correlation: CorrelationMatrix,
    pub box_by_month: Vec<GroupBoxStats>,
    pub box_by_weekday: Vec<GroupBoxStats>,
    pub daily: DailyStats,
    pub engagement: Engagement,
}

impl AnalysisResult {
    /// Distribution of a variable by name (`"start_time"`, `"end_time"`,
    /// `"duration"`, `"total_energy"`, `"average_power"`).
    pub fn variable(&self, name: &str) -> Option<&VariableDistribution> {
        self.variables.iter().find(|v| v.name == name)
    }
}

// ── Public function ───────────────────────────────────────────────────────────

/// Analyse `sessions`, using `bins` equal-width bins for every histogram.
pub fn analyze_sessions(sessions: &[ChargingSession], bins: usize) -> AnalysisResult {
    let started = std::time::Instant::now();

    let start: Vec<f64> = sessions.iter().map(|s| s.start_time_of_day()).collect();
    let end: Vec<f64> = sessions.iter().map(|s| s.end_time_of_day()).collect();
    let duration: Vec<f64> = sessions.iter().map(|s| s.duration_minutes()).collect();
    let energy: Vec<f64> = sessions.iter().map(|s| s.total_energy()).collect();
    let power: Vec<f64> = sessions.iter().filter_map(|s| s.average_power_kw()).collect();

    let variables = [
        ("start_time", "h", &start),
        ("end_time", "h", &end),
        ("duration", "min", &duration),
        ("total_energy", "kWh", &energy),
        ("average_power", "kW", &power),
    ]
    .into_iter()
    .map(|(name, unit, values)| VariableDistribution {
        name: name.to_string(),
        unit,
        summary: Summary::from_values(values),
        histogram: histogram(values, bins),
    })
    .collect();

    let correlation = CorrelationMatrix::compute(&[
        ("start_time", start),
        ("end_time", end),
        ("duration", duration),
        ("total_energy", energy),
    ]);

    let daily = daily_stats(sessions);
    let engagement = Engagement::compute(sessions, bins);

    let metadata = AnalysisMetadata {
        generated_at: Utc::now().to_rfc3339(),
        sessions: sessions.len(),
        users: engagement.users,
        first_start: sessions
            .iter()
            .map(|s| s.start_time())
            .min()
            .map(|t| t.format(ev_core::models::CANONICAL_DATETIME_FORMAT).to_string()),
        last_end: sessions
            .iter()
            .map(|s| s.end_time())
            .max()
            .map(|t| t.format(ev_core::models::CANONICAL_DATETIME_FORMAT).to_string()),
        active_days: daily.days,
        total_energy: sessions.iter().map(|s| s.total_energy()).sum(),
        analysis_time_seconds: started.elapsed().as_secs_f64(),
    };

    debug!(
        "analyze_sessions: {} sessions, {} users, {} days",
        metadata.sessions, metadata.users, metadata.active_days
    );

    AnalysisResult {
        metadata,
        variables,
        by_month: categorical(sessions, 12, month_index, |i| month_label(i as u32 + 1)),
        by_weekday: categorical(sessions, 7, weekday_index, |i| weekday_label(WEEKDAYS[i])),
        correlation,
        box_by_month: grouped_box_stats(sessions, 12, month_index, |i| {
            month_label(i as u32 + 1)
        }),
        box_by_weekday: grouped_box_stats(sessions, 7, weekday_index, |i| {
            weekday_label(WEEKDAYS[i])
        }),
        daily,
        engagement,
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

const WEEKDAYS: [chrono::Weekday; 7] = [
    chrono::Weekday::Mon,
    chrono::Weekday::Tue,
    chrono::Weekday::Wed,
    chrono::Weekday::Thu,
    chrono::Weekday::Fri,
    chrono::Weekday::Sat,
    chrono::Weekday::Sun,
];

fn weekday_index(s: &ChargingSession) -> usize {
    s.day_of_week().num_days_from_monday() as usize
}

fn month_index(s: &ChargingSession) -> usize {
    s.month().saturating_sub(1) as usize
}

/// Session counts for every category `0..n`, including empty ones.
fn categorical(
    sessions: &[ChargingSession],
    n: usize,
    index: impl Fn(&ChargingSession) -> usize,
    label: impl Fn(usize) -> &'static str,
) -> Vec<CategoryCount> {
    let mut counts = vec![0usize; n];
    for s in sessions {
        if let Some(c) = counts.get_mut(index(s)) {
            *c += 1;
        }
    }
    let total = sessions.len();
    counts
        .into_iter()
        .enumerate()
        .map(|(i, sessions)| CategoryCount {
            label: label(i).to_string(),
            sessions,
            share: if total == 0 {
                0.0
            } else {
                sessions as f64 / total as f64
            },
        })
        .collect()
}

/// Box statistics for every non-empty category.
fn grouped_box_stats(
    sessions: &[ChargingSession],
    n: usize,
    index: impl Fn(&ChargingSession) -> usize,
    label: impl Fn(usize) -> &'static str,
) -> Vec<GroupBoxStats> {
    let mut groups: Vec<Vec<&ChargingSession>> = vec![Vec::new(); n];
    for s in sessions {
        if let Some(g) = groups.get_mut(index(s)) {
            g.push(s);
        }
    }

    groups
        .into_iter()
        .enumerate()
        .filter(|(_, g)| !g.is_empty())
        .map(|(i, g)| {
            let pick = |f: fn(&ChargingSession) -> f64| g.iter().map(|s| f(s)).collect::<Vec<_>>();
            GroupBoxStats {
                group: label(i).to_string(),
                start_time: BoxStats::from_values(&pick(ChargingSession::start_time_of_day)),
                end_time: BoxStats::from_values(&pick(ChargingSession::end_time_of_day)),
                duration: BoxStats::from_values(&pick(ChargingSession::duration_minutes)),
            }
        })
        .collect()
}

fn daily_stats(sessions: &[ChargingSession]) -> DailyStats {
    let days = SessionAggregator::aggregate_daily(sessions);
    let per_day = |f: fn(&crate::aggregator::AggregatedPeriod) -> f64| {
        Summary::from_values(&days.iter().map(f).collect::<Vec<_>>())
    };
    DailyStats {
        days: days.len(),
        sessions_per_day: per_day(|p| p.stats.sessions as f64),
        energy_per_day: per_day(|p| p.stats.total_energy),
        users_per_day: per_day(|p| p.distinct_users() as f64),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn session(id: &str, start: &str, end: &str, kwh: f64) -> ChargingSession {
        let parse = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap();
        ChargingSession::try_new(id, parse(start), parse(end), kwh).unwrap()
    }

    fn fixture() -> Vec<ChargingSession> {
        vec![
            session("EV1", "2023-01-02 08:00", "2023-01-02 10:00", 10.0),
            session("EV2", "2023-01-02 09:00", "2023-01-02 13:00", 20.0),
            session("EV1", "2023-01-03 07:00", "2023-01-03 08:00", 5.0),
            session("EV3", "2023-03-04 12:00", "2023-03-04 18:00", 30.0),
        ]
    }

    #[test]
    fn test_metadata() {
        let r = analyze_sessions(&fixture(), 4);
        assert_eq!(r.metadata.sessions, 4);
        assert_eq!(r.metadata.users, 3);
        assert_eq!(r.metadata.active_days, 3);
        assert_eq!(r.metadata.first_start.as_deref(), Some("2023-01-02 08:00:00"));
        assert_eq!(r.metadata.last_end.as_deref(), Some("2023-03-04 18:00:00"));
        assert!((r.metadata.total_energy - 65.0).abs() < 1e-9);
    }

    #[test]
    fn test_variable_summaries() {
        let r = analyze_sessions(&fixture(), 4);
        let duration = r.variable("duration").unwrap();
        assert_eq!(duration.summary.count, 4);
        assert_eq!(duration.unit, "min");
        assert!((duration.summary.mean - 195.0).abs() < 1e-9);
        assert_eq!(duration.summary.min, 60.0);
        assert_eq!(duration.summary.max, 360.0);
        assert_eq!(duration.histogram.len(), 4);

        let power = r.variable("average_power").unwrap();
        assert!((power.summary.max - 5.0).abs() < 1e-9);
        assert!(r.variable("unknown").is_none());
    }

    #[test]
    fn test_categorical_distributions() {
        let r = analyze_sessions(&fixture(), 4);
        assert_eq!(r.by_month.len(), 12);
        assert_eq!(r.by_month[0].label, "Jan");
        assert_eq!(r.by_month[0].sessions, 3);
        assert!((r.by_month[0].share - 0.75).abs() < 1e-9);
        assert_eq!(r.by_month[2].sessions, 1);

        assert_eq!(r.by_weekday.len(), 7);
        assert_eq!(r.by_weekday[0].sessions, 2); // Mon
        assert_eq!(r.by_weekday[1].sessions, 1); // Tue
        assert_eq!(r.by_weekday[5].sessions, 1); // Sat
        let total: usize = r.by_weekday.iter().map(|c| c.sessions).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_correlation_duration_energy() {
        let r = analyze_sessions(&fixture(), 4);
        let c = r.correlation.get("duration", "total_energy").unwrap();
        assert!(c > 0.9);
        let diag = r.correlation.get("total_energy", "total_energy").unwrap();
        assert!((diag - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_box_stats_only_for_present_groups() {
        let r = analyze_sessions(&fixture(), 4);
        let months: Vec<&str> = r.box_by_month.iter().map(|g| g.group.as_str()).collect();
        assert_eq!(months, vec!["Jan", "Mar"]);
        assert_eq!(r.box_by_month[0].start_time.count, 3);
        assert_eq!(r.box_by_month[0].start_time.median, 8.0);
        assert_eq!(r.box_by_month[0].duration.median, 120.0);
        assert_eq!(r.box_by_weekday.len(), 3);
    }

    #[test]
    fn test_daily_stats() {
        let r = analyze_sessions(&fixture(), 4);
        assert_eq!(r.daily.days, 3);
        assert_eq!(r.daily.sessions_per_day.max, 2.0);
        assert_eq!(r.daily.users_per_day.max, 2.0);
    }

    #[test]
    fn test_empty_input() {
        let r = analyze_sessions(&[], DEFAULT_BINS);
        assert_eq!(r.metadata.sessions, 0);
        assert!(r.metadata.first_start.is_none());
        assert!(r.variables.iter().all(|v| v.histogram.is_empty()));
        assert!(r.box_by_month.is_empty());
        assert_eq!(r.engagement.users, 0);
    }

    #[test]
    fn test_result_serializes() {
        let r = analyze_sessions(&fixture(), 4);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["metadata"]["sessions"], 4);
        assert_eq!(json["by_weekday"][0]["label"], "Mon");
        assert!(json["correlation"]["values"].is_array());
    }
}
