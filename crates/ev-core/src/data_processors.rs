use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::trace;

use crate::mapping::DatetimeFormat;
use crate::models::RawValue;

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Parses raw timestamp cells into timezone-naive wall-clock times.
pub struct TimestampProcessor;

/// Layouts tried, in order, when the mapping asks for `auto`.
const AUTO_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%a, %d %b %Y %H:%M:%S GMT",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
];

impl TimestampProcessor {
    /// Parse `value` according to `format`.
    ///
    /// The error string describes why the value was rejected; it does not
    /// repeat the value itself.
    pub fn parse(value: &RawValue, format: &DatetimeFormat) -> Result<NaiveDateTime, String> {
        match (value, format) {
            (RawValue::Null, _) => Err("value is null".to_string()),
            (RawValue::Number(n), DatetimeFormat::Auto) => Self::from_unix_seconds(*n),
            (RawValue::Number(_), DatetimeFormat::Strftime(fmt)) => {
                Self::parse_with_format(&value.render(), fmt)
            }
            (RawValue::Text(s), DatetimeFormat::Strftime(fmt)) => {
                Self::parse_with_format(s.trim(), fmt)
            }
            (RawValue::Text(s), DatetimeFormat::Auto) => Self::parse_auto(s.trim()),
        }
    }

    /// Parse with a single explicit layout.
    ///
    /// Layouts carrying an offset keep the local wall-clock time; date-only
    /// layouts yield midnight.
    pub fn parse_with_format(s: &str, fmt: &str) -> Result<NaiveDateTime, String> {
        if s.is_empty() {
            return Err("value is empty".to_string());
        }
        let naive_err = match NaiveDateTime::parse_from_str(s, fmt) {
            Ok(dt) => return Ok(dt),
            Err(e) => e,
        };
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.naive_local());
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt);
            }
        }
        Err(format!("does not match format \"{}\": {}", fmt, naive_err))
    }

    fn parse_auto(s: &str) -> Result<NaiveDateTime, String> {
        if s.is_empty() {
            return Err("value is empty".to_string());
        }

        // Replace trailing 'Z' with '+00:00' for RFC 3339 compatibility.
        let normalised = if let Some(stripped) = s.strip_suffix('Z') {
            format!("{}+00:00", stripped)
        } else {
            s.to_string()
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Ok(dt.naive_local());
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Ok(dt.naive_local());
        }

        for fmt in AUTO_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(dt);
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                    return Ok(dt);
                }
            }
        }

        trace!("TimestampProcessor: no known layout for \"{}\"", s);
        Err("does not match any known datetime layout".to_string())
    }

    fn from_unix_seconds(n: f64) -> Result<NaiveDateTime, String> {
        if !n.is_finite() {
            return Err("timestamp is not finite".to_string());
        }
        // Nanoseconds are always added, so split below the value.
        let mut secs = n.floor() as i64;
        let mut nanos = ((n - n.floor()) * 1_000_000_000.0).round() as u32;
        if nanos >= 1_000_000_000 {
            secs += 1;
            nanos -= 1_000_000_000;
        }
        DateTime::from_timestamp(secs, nanos)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| "Unix timestamp out of range".to_string())
    }
}

// ── NumberParser ──────────────────────────────────────────────────────────────

/// Coerces raw cells to real numbers.
pub struct NumberParser;

impl NumberParser {
    /// Parse `value` as an `f64`.
    ///
    /// Returns `Ok(None)` for null or blank cells so that callers can apply
    /// their own missing-value policy. Non-finite results are rejected.
    pub fn parse(value: &RawValue) -> Result<Option<f64>, String> {
        let n = match value {
            RawValue::Null => return Ok(None),
            RawValue::Number(n) => *n,
            RawValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                trimmed
                    .parse::<f64>()
                    .map_err(|e| format!("not a number: {}", e))?
            }
        };
        if !n.is_finite() {
            return Err("number is not finite".to_string());
        }
        Ok(Some(n))
    }
}

// ── DataConverter ─────────────────────────────────────────────────────────────

/// Utility helpers for transforming raw JSON records.
pub struct DataConverter;

impl DataConverter {
    /// Flatten a nested JSON object into a single-level map with dotted keys.
    ///
    /// For example, `{"a": {"b": 1}}` with prefix `""` becomes
    /// `{"a.b": 1}` (or `{"prefix.a.b": 1}` when `prefix` is non-empty).
    pub fn flatten_nested(
        data: &serde_json::Value,
        prefix: &str,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut result = serde_json::Map::new();
        Self::flatten_inner(data, prefix, &mut result);
        result
    }

    fn flatten_inner(
        value: &serde_json::Value,
        prefix: &str,
        output: &mut serde_json::Map<String, serde_json::Value>,
    ) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map {
                    let new_key = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten_inner(val, &new_key, output);
                }
            }
            _ => {
                output.insert(prefix.to_string(), value.clone());
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    fn fmt(s: &str) -> DatetimeFormat {
        DatetimeFormat::Strftime(s.to_string())
    }

    // ── TimestampProcessor ───────────────────────────────────────────────────

    #[test]
    fn test_parse_explicit_format() {
        let dt = TimestampProcessor::parse(&"2023-01-01 08:00".into(), &fmt("%Y-%m-%d %H:%M"))
            .unwrap();
        assert_eq!(dt.hour(), 8);
        assert_eq!(dt.day(), 1);
    }

    #[test]
    fn test_parse_explicit_format_trims_whitespace() {
        let dt = TimestampProcessor::parse(&"  2023-01-01 08:00 ".into(), &fmt("%Y-%m-%d %H:%M"))
            .unwrap();
        assert_eq!(dt.minute(), 0);
    }

    #[test]
    fn test_parse_explicit_format_mismatch() {
        let err = TimestampProcessor::parse(&"01/01/2023".into(), &fmt("%Y-%m-%d %H:%M"))
            .unwrap_err();
        assert!(err.contains("%Y-%m-%d %H:%M"));
    }

    #[test]
    fn test_parse_null_is_error() {
        assert!(TimestampProcessor::parse(&RawValue::Null, &DatetimeFormat::Auto).is_err());
        assert!(TimestampProcessor::parse(&RawValue::Null, &fmt("%Y")).is_err());
    }

    #[test]
    fn test_parse_date_only_format_is_midnight() {
        let dt = TimestampProcessor::parse(&"2023-05-06".into(), &fmt("%Y-%m-%d")).unwrap();
        assert_eq!((dt.hour(), dt.minute()), (0, 0));
    }

    #[test]
    fn test_parse_offset_format_keeps_wall_clock() {
        let dt = TimestampProcessor::parse(
            &"2023-05-06 14:00:00 +0500".into(),
            &fmt("%Y-%m-%d %H:%M:%S %z"),
        )
        .unwrap();
        assert_eq!(dt.hour(), 14);
    }

    #[test]
    fn test_parse_number_with_explicit_format() {
        let dt = TimestampProcessor::parse(&RawValue::Number(20230101.0), &fmt("%Y%m%d")).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2023, 1, 1));
    }

    #[test]
    fn test_parse_auto_canonical_layout() {
        let dt = TimestampProcessor::parse(&"2023-01-01 08:00:00".into(), &DatetimeFormat::Auto)
            .unwrap();
        assert_eq!(dt.hour(), 8);
    }

    #[test]
    fn test_parse_auto_rfc3339_keeps_wall_clock() {
        let dt = TimestampProcessor::parse(
            &"2024-03-20T14:00:00+05:00".into(),
            &DatetimeFormat::Auto,
        )
        .unwrap();
        assert_eq!(dt.hour(), 14);
    }

    #[test]
    fn test_parse_auto_acn_layout() {
        let dt = TimestampProcessor::parse(
            &"Wed, 25 Apr 2018 11:08:04 GMT".into(),
            &DatetimeFormat::Auto,
        )
        .unwrap();
        assert_eq!((dt.month(), dt.day(), dt.hour()), (4, 25, 11));
    }

    #[test]
    fn test_parse_auto_unix_seconds() {
        let dt = TimestampProcessor::parse(&RawValue::Number(0.0), &DatetimeFormat::Auto).unwrap();
        assert_eq!(dt.year(), 1970);
    }

    #[test]
    fn test_parse_auto_negative_fractional_unix_seconds() {
        let dt = TimestampProcessor::parse(&RawValue::Number(-1.5), &DatetimeFormat::Auto).unwrap();
        let expected = NaiveDateTime::parse_from_str(
            "1969-12-31 23:59:58.500",
            "%Y-%m-%d %H:%M:%S%.f",
        )
        .unwrap();
        assert_eq!(dt, expected);

        let dt = TimestampProcessor::parse(&RawValue::Number(1.25), &DatetimeFormat::Auto).unwrap();
        assert_eq!(dt.and_utc().timestamp_millis(), 1_250);
    }

    #[test]
    fn test_parse_auto_garbage() {
        assert!(TimestampProcessor::parse(&"yesterday".into(), &DatetimeFormat::Auto).is_err());
    }

    // ── NumberParser ─────────────────────────────────────────────────────────

    #[test]
    fn test_number_parser_text_and_number() {
        assert_eq!(NumberParser::parse(&" 5.0 ".into()), Ok(Some(5.0)));
        assert_eq!(NumberParser::parse(&RawValue::Number(1.25)), Ok(Some(1.25)));
    }

    #[test]
    fn test_number_parser_blank_is_none() {
        assert_eq!(NumberParser::parse(&RawValue::Null), Ok(None));
        assert_eq!(NumberParser::parse(&"".into()), Ok(None));
    }

    #[test]
    fn test_number_parser_rejects_garbage_and_nan() {
        assert!(NumberParser::parse(&"five".into()).is_err());
        assert!(NumberParser::parse(&"NaN".into()).is_err());
        assert!(NumberParser::parse(&"inf".into()).is_err());
    }

    // ── DataConverter ────────────────────────────────────────────────────────

    #[test]
    fn test_flatten_nested() {
        let data = json!({"a": {"b": 1, "c": {"d": "x"}}, "e": null});
        let flat = DataConverter::flatten_nested(&data, "");
        assert_eq!(flat.get("a.b"), Some(&json!(1)));
        assert_eq!(flat.get("a.c.d"), Some(&json!("x")));
        assert_eq!(flat.get("e"), Some(&json!(null)));
    }

    #[test]
    fn test_flatten_nested_with_prefix() {
        let data = json!({"kWh": 3.2});
        let flat = DataConverter::flatten_nested(&data, "userInputs");
        assert_eq!(flat.get("userInputs.kWh"), Some(&json!(3.2)));
    }
}
