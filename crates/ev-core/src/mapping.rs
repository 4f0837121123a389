//! Field mapping and normalization policy.
//!
//! A [`FieldMapping`] tells the normalizer which raw column supplies each
//! canonical field and how timestamps are written in the source.

use std::path::Path;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::error::{EvError, Result};
use crate::models::CANONICAL_COLUMNS;

/// The keyword that selects format inference instead of a fixed layout.
pub const AUTO_DATETIME_FORMAT: &str = "auto";

// ── DatetimeFormat ────────────────────────────────────────────────────────────

/// How timestamp cells are parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatetimeFormat {
    /// A fixed `strftime` layout, e.g. `"%Y-%m-%d %H:%M"`.
    Strftime(String),
    /// Try a list of common layouts and Unix seconds.
    Auto,
}

impl DatetimeFormat {
    /// Parse a format string, rejecting empty strings and invalid directives.
    pub fn parse(fmt: &str) -> Result<Self> {
        let trimmed = fmt.trim();
        if trimmed.is_empty() {
            return Err(EvError::Config("datetime_format must not be empty".into()));
        }
        if trimmed.eq_ignore_ascii_case(AUTO_DATETIME_FORMAT) {
            return Ok(DatetimeFormat::Auto);
        }
        if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
            return Err(EvError::Config(format!(
                "datetime_format \"{}\" contains an invalid directive",
                fmt
            )));
        }
        Ok(DatetimeFormat::Strftime(fmt.to_string()))
    }
}

// ── Policies ──────────────────────────────────────────────────────────────────

/// What to do with a parsed energy value below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NegativeEnergyPolicy {
    /// Record a validation failure for the row.
    #[default]
    Reject,
    /// Coerce the value to `0.0`.
    #[value(name = "clip")]
    #[serde(alias = "clip")]
    ClipToZero,
}

/// What to do with a null or blank energy cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Record a parse failure for the row.
    #[default]
    Reject,
    /// Treat the cell as `0.0` kWh.
    #[value(name = "zero")]
    #[serde(alias = "zero")]
    DefaultToZero,
}

/// Row coercion rules applied by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NormalizationPolicy {
    #[serde(default)]
    pub negative_energy: NegativeEnergyPolicy,
    #[serde(default)]
    pub missing_energy: MissingValuePolicy,
}

// ── FieldMapping ──────────────────────────────────────────────────────────────

/// Source column for each canonical field, plus the timestamp layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub ev_id_column: String,
    pub start_column: String,
    pub end_column: String,
    pub energy_column: String,
    pub datetime_format: String,
}

impl FieldMapping {
    pub fn new(
        ev_id_column: impl Into<String>,
        start_column: impl Into<String>,
        end_column: impl Into<String>,
        energy_column: impl Into<String>,
        datetime_format: impl Into<String>,
    ) -> Self {
        Self {
            ev_id_column: ev_id_column.into(),
            start_column: start_column.into(),
            end_column: end_column.into(),
            energy_column: energy_column.into(),
            datetime_format: datetime_format.into(),
        }
    }

    /// Mapping for files that already use the canonical column names.
    pub fn canonical() -> Self {
        let [id, start, end, energy] = CANONICAL_COLUMNS;
        Self::new(id, start, end, energy, AUTO_DATETIME_FORMAT)
    }

    /// Parse a mapping from a JSON document. A missing key is a
    /// configuration error.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EvError::Config(format!("invalid field mapping: {}", e)))
    }

    /// Read and parse a JSON mapping file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&content)
    }

    /// Check the mapping and resolve its datetime format.
    pub fn validate(&self) -> Result<DatetimeFormat> {
        let columns = [
            ("ev_id_column", &self.ev_id_column),
            ("start_column", &self.start_column),
            ("end_column", &self.end_column),
            ("energy_column", &self.energy_column),
        ];
        for (key, value) in columns {
            if value.trim().is_empty() {
                return Err(EvError::Config(format!("{} must not be empty", key)));
            }
        }
        DatetimeFormat::parse(&self.datetime_format)
    }
}
