use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime, TimeDelta, Timelike, Weekday};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Column names of the canonical four-column schema, in output order.
pub const CANONICAL_COLUMNS: [&str; 4] =
    ["EV_id_x", "start_datetime", "end_datetime", "total_energy"];

/// Timestamp layout used when writing canonical files. Sub-second parts are
/// written only when present.
pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ── Raw input ─────────────────────────────────────────────────────────────────

/// A single cell of a raw, source-specific table.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Number(f64),
}

impl RawValue {
    /// `true` for `Null` and for text that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Number(_) => false,
        }
    }

    /// Render the value as it would appear in a text file.
    ///
    /// Integral numbers are printed without a fractional part so that numeric
    /// identifiers such as `17` do not turn into `"17.0"`.
    pub fn render(&self) -> String {
        match self {
            RawValue::Null => String::new(),
            RawValue::Text(s) => s.clone(),
            RawValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<&serde_json::Value> for RawValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::String(s) => RawValue::Text(s.clone()),
            serde_json::Value::Number(n) => n.as_f64().map_or(RawValue::Null, RawValue::Number),
            serde_json::Value::Bool(b) => RawValue::Text(b.to_string()),
            other => RawValue::Text(other.to_string()),
        }
    }
}

/// One row of a raw table: raw column name to raw value.
pub type RawRow = BTreeMap<String, RawValue>;

/// An ordered raw table as produced by a reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Column names in file order.
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self { columns, rows }
    }

    /// Build a table from rows alone, deriving the column list from the keys
    /// in order of first appearance.
    pub fn from_rows(rows: Vec<RawRow>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

// ── ChargingSession ───────────────────────────────────────────────────────────

/// A domain invariant violated by an otherwise well-typed session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    #[error("EV id is empty")]
    EmptyId,

    #[error("end {end} is before start {start}")]
    EndBeforeStart {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("total energy {0} kWh is negative")]
    NegativeEnergy(f64),

    #[error("total energy is not a finite number")]
    NonFiniteEnergy,
}

/// One charging event in the canonical schema.
///
/// Instances can only be built through [`ChargingSession::try_new`], so every
/// value satisfies `end_time >= start_time`, `total_energy >= 0` and has a
/// non-empty id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargingSession {
    #[serde(rename = "EV_id_x")]
    ev_id: String,
    #[serde(rename = "start_datetime", serialize_with = "serialize_canonical")]
    start_time: NaiveDateTime,
    #[serde(rename = "end_datetime", serialize_with = "serialize_canonical")]
    end_time: NaiveDateTime,
    total_energy: f64,
}

fn serialize_canonical<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&dt.format(CANONICAL_DATETIME_FORMAT))
}

impl ChargingSession {
    /// Validate and build a session. The id is trimmed.
    pub fn try_new(
        ev_id: impl Into<String>,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        total_energy: f64,
    ) -> Result<Self, ValidationIssue> {
        let ev_id = ev_id.into().trim().to_string();
        if ev_id.is_empty() {
            return Err(ValidationIssue::EmptyId);
        }
        if end_time < start_time {
            return Err(ValidationIssue::EndBeforeStart {
                start: start_time,
                end: end_time,
            });
        }
        if !total_energy.is_finite() {
            return Err(ValidationIssue::NonFiniteEnergy);
        }
        if total_energy < 0.0 {
            return Err(ValidationIssue::NegativeEnergy(total_energy));
        }
        Ok(Self {
            ev_id,
            start_time,
            end_time,
            total_energy,
        })
    }

    pub fn ev_id(&self) -> &str {
        &self.ev_id
    }

    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    pub fn end_time(&self) -> NaiveDateTime {
        self.end_time
    }

    /// Delivered energy in kWh.
    pub fn total_energy(&self) -> f64 {
        self.total_energy
    }

    pub fn duration(&self) -> TimeDelta {
        self.end_time - self.start_time
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration().num_seconds() as f64 / 60.0
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration().num_seconds() as f64 / 3600.0
    }

    /// Mean charging power in kW, `None` for a zero-length session.
    pub fn average_power_kw(&self) -> Option<f64> {
        let hours = self.duration_hours();
        if hours <= 0.0 {
            return None;
        }
        Some(self.total_energy / hours)
    }

    /// Start time of day in fractional hours (`08:30` → `8.5`).
    pub fn start_time_of_day(&self) -> f64 {
        hours_of_day(self.start_time)
    }

    /// End time of day in fractional hours.
    pub fn end_time_of_day(&self) -> f64 {
        hours_of_day(self.end_time)
    }

    /// Weekday of the session start.
    pub fn day_of_week(&self) -> Weekday {
        self.start_time.weekday()
    }

    /// Calendar month (1-12) of the session start.
    pub fn month(&self) -> u32 {
        self.start_time.month()
    }
}

fn hours_of_day(dt: NaiveDateTime) -> f64 {
    dt.num_seconds_from_midnight() as f64 / 3600.0
}

/// Three-letter English weekday label (`"Mon"` .. `"Sun"`).
pub fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// Three-letter English month label for `month` in 1-12.
pub fn month_label(month: u32) -> &'static str {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    month
        .checked_sub(1)
        .and_then(|i| MONTHS.get(i as usize))
        .copied()
        .unwrap_or("???")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    // ── RawValue ───────────────────────────────────────────────────────────

    #[test]
    fn test_raw_value_blank() {
        assert!(RawValue::Null.is_blank());
        assert!(RawValue::from("   ").is_blank());
        assert!(!RawValue::from("x").is_blank());
        assert!(!RawValue::Number(0.0).is_blank());
    }

    #[test]
    fn test_raw_value_render_integral_number() {
        assert_eq!(RawValue::Number(17.0).render(), "17");
        assert_eq!(RawValue::Number(2.5).render(), "2.5");
        assert_eq!(RawValue::Null.render(), "");
    }

    #[test]
    fn test_raw_value_from_json() {
        assert_eq!(RawValue::from(&serde_json::json!(null)), RawValue::Null);
        assert_eq!(RawValue::from(&serde_json::json!(4.5)), RawValue::Number(4.5));
        assert_eq!(
            RawValue::from(&serde_json::json!("abc")),
            RawValue::Text("abc".into())
        );
        assert_eq!(
            RawValue::from(&serde_json::json!(true)),
            RawValue::Text("true".into())
        );
    }

    #[test]
    fn test_raw_table_from_rows_collects_columns() {
        let mut a = RawRow::new();
        a.insert("id".into(), RawValue::from("1"));
        let mut b = RawRow::new();
        b.insert("id".into(), RawValue::from("2"));
        b.insert("kwh".into(), RawValue::Number(1.0));
        let table = RawTable::from_rows(vec![a, b]);
        assert_eq!(table.columns, vec!["id".to_string(), "kwh".to_string()]);
        assert_eq!(table.len(), 2);
        assert!(table.has_column("kwh"));
    }

    // ── ChargingSession ────────────────────────────────────────────────────

    #[test]
    fn test_session_try_new_valid() {
        let s = ChargingSession::try_new(" EV1 ", at(1, 8, 0), at(1, 10, 0), 5.0).unwrap();
        assert_eq!(s.ev_id(), "EV1");
        assert_eq!(s.duration_minutes(), 120.0);
        assert_eq!(s.average_power_kw(), Some(2.5));
    }

    #[test]
    fn test_session_rejects_empty_id() {
        let err = ChargingSession::try_new("  ", at(1, 8, 0), at(1, 9, 0), 1.0).unwrap_err();
        assert_eq!(err, ValidationIssue::EmptyId);
    }

    #[test]
    fn test_session_rejects_end_before_start() {
        let err = ChargingSession::try_new("EV1", at(1, 10, 0), at(1, 9, 0), 1.0).unwrap_err();
        assert!(matches!(err, ValidationIssue::EndBeforeStart { .. }));
    }

    #[test]
    fn test_session_rejects_negative_and_nan_energy() {
        let neg = ChargingSession::try_new("EV1", at(1, 8, 0), at(1, 9, 0), -0.5).unwrap_err();
        assert_eq!(neg, ValidationIssue::NegativeEnergy(-0.5));
        let nan = ChargingSession::try_new("EV1", at(1, 8, 0), at(1, 9, 0), f64::NAN).unwrap_err();
        assert_eq!(nan, ValidationIssue::NonFiniteEnergy);
    }

    #[test]
    fn test_session_zero_duration_has_no_power() {
        let s = ChargingSession::try_new("EV1", at(1, 8, 0), at(1, 8, 0), 0.0).unwrap();
        assert_eq!(s.average_power_kw(), None);
    }

    #[test]
    fn test_session_calendar_keys() {
        // 2023-01-02 was a Monday.
        let s = ChargingSession::try_new("EV1", at(2, 8, 30), at(2, 17, 45), 10.0).unwrap();
        assert_eq!(s.day_of_week(), Weekday::Mon);
        assert_eq!(s.month(), 1);
        assert_eq!(s.start_time_of_day(), 8.5);
        assert_eq!(s.end_time_of_day(), 17.75);
    }

    #[test]
    fn test_session_serializes_canonical_names() {
        let s = ChargingSession::try_new("EV1", at(1, 8, 0), at(1, 10, 0), 5.0).unwrap();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["EV_id_x"], "EV1");
        assert_eq!(json["start_datetime"], "2023-01-01 08:00:00");
        assert_eq!(json["end_datetime"], "2023-01-01 10:00:00");
        assert_eq!(json["total_energy"], 5.0);
    }

    #[test]
    fn test_labels() {
        assert_eq!(weekday_label(Weekday::Sun), "Sun");
        assert_eq!(month_label(1), "Jan");
        assert_eq!(month_label(12), "Dec");
        assert_eq!(month_label(0), "???");
    }
}
