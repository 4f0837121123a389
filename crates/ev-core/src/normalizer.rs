//! Schema normalization: raw, source-specific rows into [`ChargingSession`]s.
//!
//! Every row is handled independently. A row that cannot be mapped, parsed or
//! validated is recorded as a [`RowFailure`] and never stops the batch; only a
//! malformed [`FieldMapping`] aborts the call.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::data_processors::{NumberParser, TimestampProcessor};
use crate::error::Result;
use crate::mapping::{
    DatetimeFormat, FieldMapping, MissingValuePolicy, NegativeEnergyPolicy, NormalizationPolicy,
};
use crate::models::{ChargingSession, RawRow, RawTable, RawValue, ValidationIssue};

// ── Row errors ────────────────────────────────────────────────────────────────

/// Why a single row was dropped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    /// A configured raw column is absent from the row.
    #[error("missing column '{column}'")]
    MissingField { column: String },

    /// A value could not be coerced to the expected type.
    #[error("cannot parse {field} from '{value}': {reason}")]
    Parse {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// The parsed values violate a domain invariant.
    #[error("{0}")]
    Validation(#[from] ValidationIssue),
}

/// Coarse classification of a [`RowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RowErrorKind {
    MissingField,
    Parse,
    Validation,
}

impl RowError {
    pub fn kind(&self) -> RowErrorKind {
        match self {
            RowError::MissingField { .. } => RowErrorKind::MissingField,
            RowError::Parse { .. } => RowErrorKind::Parse,
            RowError::Validation(_) => RowErrorKind::Validation,
        }
    }
}

impl std::fmt::Display for RowErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RowErrorKind::MissingField => "MissingFieldError",
            RowErrorKind::Parse => "ParseError",
            RowErrorKind::Validation => "ValidationError",
        };
        f.write_str(name)
    }
}

/// A dropped row: its zero-based index in the input table and the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    pub row_index: usize,
    pub error: RowError,
}

impl RowFailure {
    pub fn kind(&self) -> RowErrorKind {
        self.error.kind()
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

// ── Normalized ────────────────────────────────────────────────────────────────

/// Result of normalizing one raw table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Valid sessions in input order.
    pub sessions: Vec<ChargingSession>,
    /// Dropped rows ordered by row index.
    pub failures: Vec<RowFailure>,
}

impl Normalized {
    pub fn rows_processed(&self) -> usize {
        self.sessions.len() + self.failures.len()
    }

    /// Share of input rows that failed, `0.0` for an empty input.
    pub fn failure_rate(&self) -> f64 {
        let total = self.rows_processed();
        if total == 0 {
            return 0.0;
        }
        self.failures.len() as f64 / total as f64
    }

    /// Number of failures per error kind.
    pub fn failure_counts(&self) -> BTreeMap<RowErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.kind()).or_insert(0) += 1;
        }
        counts
    }
}

// ── MappedRow ─────────────────────────────────────────────────────────────────

/// The four canonical cells of a raw row, looked up through the mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow<'a> {
    pub ev_id: &'a RawValue,
    pub start: &'a RawValue,
    pub end: &'a RawValue,
    pub energy: &'a RawValue,
}

impl<'a> MappedRow<'a> {
    /// Look up every mapped column; the first absent one is reported.
    pub fn extract(row: &'a RawRow, mapping: &FieldMapping) -> std::result::Result<Self, RowError> {
        let lookup = move |column: &str| {
            row.get(column).ok_or_else(|| RowError::MissingField {
                column: column.to_string(),
            })
        };
        Ok(Self {
            ev_id: lookup(&mapping.ev_id_column)?,
            start: lookup(&mapping.start_column)?,
            end: lookup(&mapping.end_column)?,
            energy: lookup(&mapping.energy_column)?,
        })
    }
}

// ── SchemaNormalizer ──────────────────────────────────────────────────────────

/// Maps raw tables onto the canonical schema with a fixed configuration.
#[derive(Debug, Clone)]
pub struct SchemaNormalizer {
    mapping: FieldMapping,
    format: DatetimeFormat,
    policy: NormalizationPolicy,
}

impl SchemaNormalizer {
    /// Validate `mapping` once and build a normalizer with the default policy.
    pub fn new(mapping: FieldMapping) -> Result<Self> {
        Self::with_policy(mapping, NormalizationPolicy::default())
    }

    pub fn with_policy(mapping: FieldMapping, policy: NormalizationPolicy) -> Result<Self> {
        let format = mapping.validate()?;
        Ok(Self {
            mapping,
            format,
            policy,
        })
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    pub fn policy(&self) -> NormalizationPolicy {
        self.policy
    }

    /// Normalize every row of `table`.
    pub fn normalize(&self, table: &RawTable) -> Normalized {
        let mut out = Normalized::default();

        for (row_index, row) in table.rows.iter().enumerate() {
            match self.normalize_row(row) {
                Ok(session) => out.sessions.push(session),
                Err(error) => {
                    trace!("Row {} dropped: {}", row_index, error);
                    out.failures.push(RowFailure { row_index, error });
                }
            }
        }

        debug!(
            "Normalized {} rows: {} sessions, {} failures",
            table.rows.len(),
            out.sessions.len(),
            out.failures.len()
        );
        out
    }

    /// Map, parse and validate a single row.
    pub fn normalize_row(&self, row: &RawRow) -> std::result::Result<ChargingSession, RowError> {
        let mapped = MappedRow::extract(row, &self.mapping)?;

        let start = self.parse_timestamp("start_time", mapped.start)?;
        let end = self.parse_timestamp("end_time", mapped.end)?;
        let energy = self.parse_energy(mapped.energy)?;

        let ev_id = match mapped.ev_id {
            RawValue::Null => String::new(),
            other => other.render(),
        };

        Ok(ChargingSession::try_new(ev_id, start, end, energy)?)
    }

    fn parse_timestamp(
        &self,
        field: &'static str,
        value: &RawValue,
    ) -> std::result::Result<NaiveDateTime, RowError> {
        TimestampProcessor::parse(value, &self.format).map_err(|reason| RowError::Parse {
            field,
            value: value.render(),
            reason,
        })
    }

    fn parse_energy(&self, value: &RawValue) -> std::result::Result<f64, RowError> {
        let parsed = NumberParser::parse(value).map_err(|reason| RowError::Parse {
            field: "total_energy",
            value: value.render(),
            reason,
        })?;

        let energy = match (parsed, self.policy.missing_energy) {
            (Some(n), _) => n,
            (None, MissingValuePolicy::DefaultToZero) => 0.0,
            (None, MissingValuePolicy::Reject) => {
                return Err(RowError::Parse {
                    field: "total_energy",
                    value: value.render(),
                    reason: "value is missing".to_string(),
                })
            }
        };

        if energy < 0.0 && self.policy.negative_energy == NegativeEnergyPolicy::ClipToZero {
            return Ok(0.0);
        }
        // `-0` is a valid zero; store it unsigned.
        if energy == 0.0 {
            return Ok(0.0);
        }
        Ok(energy)
    }
}

/// Normalize `table` with `mapping` and the default policy.
///
/// Fails only when the mapping itself is malformed.
pub fn normalize(table: &RawTable, mapping: &FieldMapping) -> Result<Normalized> {
    Ok(SchemaNormalizer::new(mapping.clone())?.normalize(table))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
