use clap::Parser;
use std::path::PathBuf;

use crate::error::{EvError, Result};
use crate::mapping::{
    FieldMapping, MissingValuePolicy, NegativeEnergyPolicy, NormalizationPolicy,
    AUTO_DATETIME_FORMAT,
};

// ── View ───────────────────────────────────────────────────────────────────────

/// Report rendered by the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum View {
    /// Overview of every statistic as text.
    #[default]
    Summary,
    Daily,
    Monthly,
    Weekday,
    /// Sessions per user with cumulative share.
    Users,
    /// Rows dropped during normalization.
    Failures,
    /// The full analysis as JSON.
    Json,
}

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Exploratory analysis of EV charging sessions
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ev-eda",
    about = "Exploratory analysis of EV charging sessions",
    version
)]
pub struct Settings {
    /// Registered dataset to load (ASR, ACN_Caltech, ACN_JPL, ACN_Office001)
    #[arg(long, conflicts_with = "input", required_unless_present = "input")]
    pub dataset: Option<String>,

    /// Raw CSV or JSON file to normalize instead of a registered dataset
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// JSON file with the field mapping for --input
    #[arg(long, requires = "input")]
    pub mapping: Option<PathBuf>,

    /// Raw column holding the vehicle / user id
    #[arg(long, default_value = "EV_id_x")]
    pub ev_id_column: String,

    /// Raw column holding the session start
    #[arg(long, default_value = "start_datetime")]
    pub start_column: String,

    /// Raw column holding the session end
    #[arg(long, default_value = "end_datetime")]
    pub end_column: String,

    /// Raw column holding the delivered energy (kWh)
    #[arg(long, default_value = "total_energy")]
    pub energy_column: String,

    /// strftime layout of the timestamp columns, or "auto"
    #[arg(long, default_value = AUTO_DATETIME_FORMAT)]
    pub datetime_format: String,

    /// Field delimiter of CSV input
    #[arg(long, default_value = ",")]
    pub delimiter: char,

    /// Root directory holding raw/ and formatted/ dataset files
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Rebuild the formatted dataset even if it already exists
    #[arg(long)]
    pub force: bool,

    /// Report view
    #[arg(long, value_enum, default_value_t = View::Summary)]
    pub view: View,

    /// Handling of negative energy values
    #[arg(long, value_enum, default_value_t = NegativeEnergyPolicy::Reject)]
    pub negative_energy: NegativeEnergyPolicy,

    /// Handling of missing energy values
    #[arg(long, value_enum, default_value_t = MissingValuePolicy::Reject)]
    pub missing_energy: MissingValuePolicy,

    /// Number of histogram bins for numeric distributions
    #[arg(long, default_value = "24", value_parser = clap::value_parser!(u32).range(1..=500))]
    pub bins: u32,

    /// Write the canonical table to this CSV file
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Effective log level: `--debug` wins over `--log-level`.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "DEBUG"
        } else {
            &self.log_level
        }
    }

    /// Row coercion policy selected on the command line.
    pub fn policy(&self) -> NormalizationPolicy {
        NormalizationPolicy {
            negative_energy: self.negative_energy,
            missing_energy: self.missing_energy,
        }
    }

    /// Field mapping for `--input`: the `--mapping` file when given,
    /// otherwise the column flags.
    pub fn field_mapping(&self) -> Result<FieldMapping> {
        if let Some(path) = &self.mapping {
            return FieldMapping::from_json_file(path);
        }
        Ok(FieldMapping::new(
            self.ev_id_column.clone(),
            self.start_column.clone(),
            self.end_column.clone(),
            self.energy_column.clone(),
            self.datetime_format.clone(),
        ))
    }

    /// The CSV delimiter as a byte.
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(EvError::Config(format!(
                "delimiter '{}' is not an ASCII character",
                self.delimiter
            )))
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
