//! Plain-text and JSON rendering of the analysis views.

use std::collections::BTreeMap;
use std::fmt::Write;

use anyhow::Result;
use ev_core::formatting::{format_duration, format_energy, format_number, format_time_of_day};
use ev_core::normalizer::Normalized;
use ev_core::settings::View;
use ev_core::stats::Summary;
use ev_data::aggregator::{AggregatedPeriod, SessionAggregator};
use ev_data::analysis::{analyze_sessions, AnalysisResult, CategoryCount};
use ev_data::engagement::user_frequency_distribution;
use serde::Serialize;

/// Failed rows listed in the failures view before truncating.
const MAX_LISTED_FAILURES: usize = 50;

/// Render `view` for the normalized sessions.
pub fn render(view: View, normalized: &Normalized, bins: usize) -> Result<String> {
    let sessions = &normalized.sessions;
    match view {
        View::Summary => summary_view(&analyze_sessions(sessions, bins), normalized),
        View::Daily => period_view("Daily", &SessionAggregator::aggregate_daily(sessions)),
        View::Monthly => period_view("Monthly", &SessionAggregator::aggregate_monthly(sessions)),
        View::Weekday => period_view("Weekday", &SessionAggregator::aggregate_by_weekday(sessions)),
        View::Users => users_view(normalized),
        View::Failures => failures_view(normalized),
        View::Json => json_view(&analyze_sessions(sessions, bins), normalized),
    }
}

// ── Views ──────────────────────────────────────────────────────────────────────

fn summary_view(analysis: &AnalysisResult, normalized: &Normalized) -> Result<String> {
    let meta = &analysis.metadata;
    let mut out = String::new();

    writeln!(out, "EV charging sessions")?;
    writeln!(out, "====================")?;
    writeln!(
        out,
        "Sessions: {} ({} rows read, {} dropped)",
        meta.sessions,
        normalized.rows_processed(),
        normalized.failures.len()
    )?;
    writeln!(out, "Users:    {}", meta.users)?;
    if let (Some(first), Some(last)) = (&meta.first_start, &meta.last_end) {
        writeln!(out, "Period:   {} .. {} ({} active days)", first, last, meta.active_days)?;
    }
    writeln!(out, "Energy:   {}", format_energy(meta.total_energy))?;
    writeln!(out)?;

    let rows: Vec<Vec<String>> = analysis
        .variables
        .iter()
        .map(|v| summary_row(&format!("{} [{}]", v.name, v.unit), &v.summary))
        .collect();
    out.push_str(&table(
        &["Variable", "Count", "Mean", "Std", "Min", "25%", "50%", "75%", "Max"],
        &rows,
    ));
    writeln!(out)?;

    writeln!(out, "Sessions by weekday")?;
    out.push_str(&category_table(&analysis.by_weekday));
    writeln!(out)?;
    writeln!(out, "Sessions by month")?;
    out.push_str(&category_table(&analysis.by_month));
    writeln!(out)?;

    writeln!(out, "Correlation")?;
    let corr = &analysis.correlation;
    let mut headers = vec![""];
    headers.extend(corr.columns.iter().map(String::as_str));
    let rows: Vec<Vec<String>> = corr
        .columns
        .iter()
        .zip(&corr.values)
        .map(|(name, values)| {
            let mut row = vec![name.clone()];
            row.extend(values.iter().map(|v| match v {
                Some(c) => format!("{:.2}", c),
                None => "-".to_string(),
            }));
            row
        })
        .collect();
    out.push_str(&table(&headers, &rows));
    writeln!(out)?;

    let e = &analysis.engagement;
    writeln!(
        out,
        "Engagement: {:.1} sessions per user on average, {:.1}% of users account for 80% of sessions",
        e.sessions_per_user.mean,
        e.users_for_80_percent * 100.0
    )?;
    Ok(out)
}

fn period_view(title: &str, periods: &[AggregatedPeriod]) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "{} sessions", title)?;

    let mut rows: Vec<Vec<String>> = periods
        .iter()
        .map(|p| {
            vec![
                p.period_key.clone(),
                p.stats.sessions.to_string(),
                p.distinct_users().to_string(),
                format_energy(p.stats.total_energy),
                format_duration(p.stats.mean_duration_minutes()),
                time_or_dash(p.stats.sessions, p.stats.mean_start_hour()),
                time_or_dash(p.stats.sessions, p.stats.mean_end_hour()),
            ]
        })
        .collect();

    let totals = SessionAggregator::calculate_totals(periods);
    rows.push(vec![
        "Total".to_string(),
        totals.sessions.to_string(),
        String::new(),
        format_energy(totals.total_energy),
        format_duration(totals.mean_duration_minutes()),
        time_or_dash(totals.sessions, totals.mean_start_hour()),
        time_or_dash(totals.sessions, totals.mean_end_hour()),
    ]);

    out.push_str(&table(
        &["Period", "Sessions", "Users", "Energy", "Avg duration", "Avg start", "Avg end"],
        &rows,
    ));
    Ok(out)
}

fn users_view(normalized: &Normalized) -> Result<String> {
    let freqs = user_frequency_distribution(&normalized.sessions);
    let total: usize = freqs.iter().map(|f| f.sessions).sum();
    let mut out = String::new();
    writeln!(out, "{} users, {} sessions", freqs.len(), total)?;

    let mut cumulative = 0usize;
    let rows: Vec<Vec<String>> = freqs
        .iter()
        .map(|f| {
            cumulative += f.sessions;
            vec![
                f.ev_id.clone(),
                f.sessions.to_string(),
                format_energy(f.total_energy),
                format!("{:.1}%", share(cumulative, total) * 100.0),
            ]
        })
        .collect();
    out.push_str(&table(&["User", "Sessions", "Energy", "Cumulative"], &rows));
    Ok(out)
}

fn failures_view(normalized: &Normalized) -> Result<String> {
    let mut out = String::new();
    writeln!(
        out,
        "{} of {} rows failed ({:.1}%)",
        normalized.failures.len(),
        normalized.rows_processed(),
        normalized.failure_rate() * 100.0
    )?;
    for (kind, count) in normalized.failure_counts() {
        writeln!(out, "  {}: {}", kind, count)?;
    }
    if normalized.failures.is_empty() {
        return Ok(out);
    }

    writeln!(out)?;
    let rows: Vec<Vec<String>> = normalized
        .failures
        .iter()
        .take(MAX_LISTED_FAILURES)
        .map(|f| vec![f.row_index.to_string(), f.kind().to_string(), f.message()])
        .collect();
    out.push_str(&table(&["Row", "Kind", "Message"], &rows));
    if normalized.failures.len() > MAX_LISTED_FAILURES {
        writeln!(
            out,
            "... {} more",
            normalized.failures.len() - MAX_LISTED_FAILURES
        )?;
    }
    Ok(out)
}

#[derive(Serialize)]
struct JsonFailure {
    row_index: usize,
    kind: String,
    message: String,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    rows_processed: usize,
    failure_counts: BTreeMap<String, usize>,
    failures: Vec<JsonFailure>,
    analysis: &'a AnalysisResult,
}

fn json_view(analysis: &AnalysisResult, normalized: &Normalized) -> Result<String> {
    let report = JsonReport {
        rows_processed: normalized.rows_processed(),
        failure_counts: normalized
            .failure_counts()
            .into_iter()
            .map(|(kind, n)| (kind.to_string(), n))
            .collect(),
        failures: normalized
            .failures
            .iter()
            .map(|f| JsonFailure {
                row_index: f.row_index,
                kind: f.kind().to_string(),
                message: f.message(),
            })
            .collect(),
        analysis,
    };
    let mut out = serde_json::to_string_pretty(&report)?;
    out.push('\n');
    Ok(out)
}

// ── Helpers ────────────────────────────────────────────────────────────────────

fn summary_row(label: &str, s: &Summary) -> Vec<String> {
    let mut row = vec![label.to_string(), s.count.to_string()];
    row.extend(
        [s.mean, s.std, s.min, s.q1, s.median, s.q3, s.max]
            .iter()
            .map(|v| format_number(*v, 2)),
    );
    row
}

fn category_table(counts: &[CategoryCount]) -> String {
    let rows: Vec<Vec<String>> = counts
        .iter()
        .map(|c| {
            vec![
                c.label.clone(),
                c.sessions.to_string(),
                format!("{:.1}%", c.share * 100.0),
            ]
        })
        .collect();
    table(&["", "Sessions", "Share"], &rows)
}

fn time_or_dash(sessions: u32, hours: f64) -> String {
    if sessions == 0 {
        "-".to_string()
    } else {
        format_time_of_day(hours)
    }
}

fn share(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Lay out `rows` under `headers`. The first column is left-aligned, the
/// others right-aligned.
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    out.push_str(&format_line(headers.iter().copied(), &widths));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in rows {
        out.push_str(&format_line(row.iter().map(String::as_str), &widths));
        out.push('\n');
    }
    out
}

fn format_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .enumerate()
        .map(|(i, (cell, w))| {
            if i == 0 {
                format!("{:<w$}", cell, w = *w)
            } else {
                format!("{:>w$}", cell, w = *w)
            }
        })
        .collect();
    padded.join("  ").trim_end().to_string()
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ev_core::mapping::FieldMapping;
    use ev_core::models::{RawRow, RawTable, RawValue};
    use ev_core::normalizer::SchemaNormalizer;

    fn normalized() -> Normalized {
        let rows = [
            ["EV1", "2023-01-02 08:00", "2023-01-02 10:00", "10.0"],
            ["EV2", "2023-01-02 09:00", "2023-01-02 13:00", "20.0"],
            ["EV1", "2023-01-03 07:00", "2023-01-03 08:00", "5.0"],
            ["EV3", "2023-01-03 12:00", "2023-01-03 11:00", "1.0"],
            ["EV3", "not a date", "2023-01-03 11:00", "1.0"],
        ]
        .iter()
        .map(|r| {
            ["id", "s", "e", "kwh"]
                .iter()
                .zip(r.iter())
                .map(|(k, v)| (k.to_string(), RawValue::from(*v)))
                .collect::<RawRow>()
        })
        .collect();
        let mapping = FieldMapping::new("id", "s", "e", "kwh", "%Y-%m-%d %H:%M");
        SchemaNormalizer::new(mapping)
            .unwrap()
            .normalize(&RawTable::from_rows(rows))
    }

    #[test]
    fn test_table_alignment() {
        let out = table(
            &["Name", "N"],
            &[vec!["a".into(), "10".into()], vec!["long".into(), "2".into()]],
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Name   N");
        assert_eq!(lines[1], "----  --");
        assert_eq!(lines[2], "a     10");
        assert_eq!(lines[3], "long   2");
    }

    #[test]
    fn test_summary_view() {
        let out = render(View::Summary, &normalized(), 4).unwrap();
        assert!(out.contains("Sessions: 3 (5 rows read, 2 dropped)"));
        assert!(out.contains("Users:    2"));
        assert!(out.contains("total_energy [kWh]"));
        assert!(out.contains("Correlation"));
    }

    #[test]
    fn test_daily_view_has_totals() {
        let out = render(View::Daily, &normalized(), 4).unwrap();
        assert!(out.contains("2023-01-02"));
        assert!(out.contains("2023-01-03"));
        let total = out.lines().find(|l| l.starts_with("Total")).unwrap();
        assert!(total.contains("35.00 kWh"));
    }

    #[test]
    fn test_weekday_view_lists_empty_days() {
        let out = render(View::Weekday, &normalized(), 4).unwrap();
        let sun = out.lines().find(|l| l.starts_with("Sun")).unwrap();
        assert!(sun.contains('-'));
    }

    #[test]
    fn test_users_view_cumulative() {
        let out = render(View::Users, &normalized(), 4).unwrap();
        assert!(out.starts_with("2 users, 3 sessions"));
        let ev1 = out.lines().find(|l| l.starts_with("EV1")).unwrap();
        assert!(ev1.ends_with("66.7%"));
    }

    #[test]
    fn test_failures_view() {
        let out = render(View::Failures, &normalized(), 4).unwrap();
        assert!(out.starts_with("2 of 5 rows failed (40.0%)"));
        assert!(out.contains("ParseError: 1"));
        assert!(out.contains("ValidationError: 1"));
    }

    #[test]
    fn test_json_view() {
        let out = render(View::Json, &normalized(), 4).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["rows_processed"], 5);
        assert_eq!(json["failure_counts"]["ParseError"], 1);
        assert_eq!(json["failures"][0]["row_index"], 3);
        assert_eq!(json["analysis"]["metadata"]["sessions"], 3);
    }
}
