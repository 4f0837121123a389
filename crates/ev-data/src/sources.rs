//! Dataset-specific preparation and the dataset registry.
//!
//! Each public dataset ships in its own raw shape. A [`DatasetSource`] turns
//! that shape into a table plus a [`FieldMapping`] the normalizer
//! understands; a [`DatasetLoader`] caches the normalized result as a
//! canonical CSV under `<root>/formatted/`.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use ev_core::error::{EvError, Result};
use ev_core::mapping::{FieldMapping, NormalizationPolicy};
use ev_core::models::{RawRow, RawTable, RawValue, CANONICAL_COLUMNS, CANONICAL_DATETIME_FORMAT};
use ev_core::normalizer::{Normalized, SchemaNormalizer};
use tracing::{debug, info};

use crate::reader::{read_canonical_csv, read_table, write_canonical_csv};

/// Layout of `connectionTime` / `disconnectTime` in ACN exports.
pub const ACN_DATETIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

// ── DatasetSource ─────────────────────────────────────────────────────────────

/// A raw dataset layout that can be mapped onto the canonical schema.
pub trait DatasetSource {
    /// Registry identifier, e.g. `"ASR"` or `"ACN_Caltech"`.
    fn dataset_id(&self) -> &str;

    /// Raw file names to look for under `<root>/raw/`, in preference order.
    fn raw_file_names(&self) -> Vec<String>;

    /// Field delimiter of the raw delimited-text file.
    fn delimiter(&self) -> u8 {
        b','
    }

    /// Reshape the raw table and describe how to normalize it.
    fn prepare(&self, raw: RawTable) -> Result<(RawTable, FieldMapping)>;
}

// ── ASR ───────────────────────────────────────────────────────────────────────

/// The ASR office-parking dataset: semicolon-separated, already using the
/// canonical column names.
#[derive(Debug, Clone, Default)]
pub struct AsrSource;

impl DatasetSource for AsrSource {
    fn dataset_id(&self) -> &str {
        "ASR"
    }

    fn raw_file_names(&self) -> Vec<String> {
        vec!["asr.csv".to_string()]
    }

    fn delimiter(&self) -> u8 {
        b';'
    }

    fn prepare(&self, raw: RawTable) -> Result<(RawTable, FieldMapping)> {
        require_columns(&raw, &CANONICAL_COLUMNS, self.dataset_id())?;

        let rows = raw
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter(|(k, _)| CANONICAL_COLUMNS.contains(&k.as_str()))
                    .collect::<RawRow>()
            })
            .collect();
        let columns = CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect();

        Ok((RawTable::new(columns, rows), FieldMapping::canonical()))
    }
}

// ── ACN ───────────────────────────────────────────────────────────────────────

/// Columns read from an ACN session export.
const ACN_COLUMNS: [&str; 5] = [
    "connectionTime",
    "disconnectTime",
    "kWhDelivered",
    "userID",
    "timezone",
];

/// An Adaptive Charging Network site export (Caltech, JPL, Office001).
#[derive(Debug, Clone)]
pub struct AcnSource {
    dataset_id: String,
    site: String,
}

impl AcnSource {
    /// `dataset_id` must look like `ACN_<Site>`.
    pub fn new(dataset_id: &str) -> Result<Self> {
        let site = dataset_id
            .split_once('_')
            .map(|(_, site)| site.to_lowercase())
            .filter(|site| !site.is_empty())
            .ok_or_else(|| EvError::UnknownDataset(dataset_id.to_string()))?;
        Ok(Self {
            dataset_id: dataset_id.to_string(),
            site,
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    /// The single IANA timezone shared by every row.
    fn site_timezone(&self, raw: &RawTable) -> Result<Tz> {
        let zones: BTreeSet<String> = raw
            .rows
            .iter()
            .filter_map(|row| row.get("timezone"))
            .filter(|v| !v.is_blank())
            .map(|v| v.render().trim().to_string())
            .collect();

        if zones.len() != 1 {
            return Err(EvError::Dataset(format!(
                "{}: expected a single timezone, but found {:?}",
                self.dataset_id, zones
            )));
        }
        let name = zones.into_iter().next().unwrap_or_default();
        name.parse::<Tz>()
            .map_err(|_| EvError::Dataset(format!("{}: unknown timezone \"{}\"", self.dataset_id, name)))
    }
}

impl DatasetSource for AcnSource {
    fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    fn raw_file_names(&self) -> Vec<String> {
        vec![
            format!("acn_{}.json", self.site),
            format!("acn_{}.csv", self.site),
        ]
    }

    fn prepare(&self, raw: RawTable) -> Result<(RawTable, FieldMapping)> {
        let mapping = FieldMapping {
            datetime_format: CANONICAL_DATETIME_FORMAT.to_string(),
            ..FieldMapping::canonical()
        };
        let columns: Vec<String> = CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect();
        if raw.is_empty() {
            return Ok((RawTable::new(columns, Vec::new()), mapping));
        }

        require_columns(&raw, &ACN_COLUMNS, &self.dataset_id)?;
        let tz = self.site_timezone(&raw)?;
        let user_ids = factorize_users(&raw.rows);

        let rows = raw
            .rows
            .iter()
            .zip(user_ids)
            .map(|(row, ev_id)| {
                let mut out = RawRow::new();
                out.insert("EV_id_x".into(), RawValue::Text(ev_id));
                out.insert("start_datetime".into(), localize(row.get("connectionTime"), tz));
                out.insert("end_datetime".into(), localize(row.get("disconnectTime"), tz));
                out.insert(
                    "total_energy".into(),
                    row.get("kWhDelivered").cloned().unwrap_or(RawValue::Null),
                );
                out
            })
            .collect();

        debug!("{}: prepared rows in timezone {}", self.dataset_id, tz);
        Ok((RawTable::new(columns, rows), mapping))
    }
}

/// Convert an ACN GMT timestamp to naive wall-clock time in `tz`.
///
/// Values that do not match [`ACN_DATETIME_FORMAT`] are passed through
/// unchanged so the normalizer reports them.
fn localize(value: Option<&RawValue>, tz: Tz) -> RawValue {
    let Some(value) = value else {
        return RawValue::Null;
    };
    let RawValue::Text(text) = value else {
        return value.clone();
    };
    match NaiveDateTime::parse_from_str(text.trim(), ACN_DATETIME_FORMAT) {
        Ok(naive) => {
            let local = Utc.from_utc_datetime(&naive).with_timezone(&tz);
            RawValue::Text(local.naive_local().format(CANONICAL_DATETIME_FORMAT).to_string())
        }
        Err(_) => value.clone(),
    }
}

/// Assign `EV0, EV1, ...` to user ids in order of first appearance.
///
/// Rows without a user id each get a distinct `missing_<n>` placeholder
/// first, so every anonymous session counts as its own user.
pub fn factorize_users(rows: &[RawRow]) -> Vec<String> {
    let mut missing = 0usize;
    let mut codes: HashMap<String, usize> = HashMap::new();

    rows.iter()
        .map(|row| {
            let key = match row.get("userID") {
                Some(v) if !v.is_blank() => v.render().trim().to_string(),
                _ => {
                    let placeholder = format!("missing_{}", missing);
                    missing += 1;
                    placeholder
                }
            };
            let next = codes.len();
            let code = *codes.entry(key).or_insert(next);
            format!("EV{}", code)
        })
        .collect()
}

fn require_columns(table: &RawTable, required: &[&str], dataset_id: &str) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|c| !table.has_column(c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EvError::Dataset(format!(
            "{}: missing required columns {:?}",
            dataset_id, missing
        )))
    }
}

// ── DatasetLoader ─────────────────────────────────────────────────────────────

/// Loads one dataset, preferring the cached canonical file.
pub struct DatasetLoader {
    source: Box<dyn DatasetSource>,
    root: PathBuf,
    force: bool,
    policy: NormalizationPolicy,
}

impl DatasetLoader {
    pub fn new(source: Box<dyn DatasetSource>, root: impl Into<PathBuf>, force: bool) -> Self {
        Self {
            source,
            root: root.into(),
            force,
            policy: NormalizationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: NormalizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dataset_id(&self) -> &str {
        self.source.dataset_id()
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn formatted_dir(&self) -> PathBuf {
        self.root.join("formatted")
    }

    /// `<root>/formatted/<dataset id, lowercased>.csv`
    pub fn formatted_path(&self) -> PathBuf {
        self.formatted_dir()
            .join(format!("{}.csv", self.dataset_id().to_lowercase()))
    }

    /// First existing raw file, if any.
    pub fn raw_path(&self) -> Option<PathBuf> {
        let raw_dir = self.raw_dir();
        self.source
            .raw_file_names()
            .into_iter()
            .map(|name| raw_dir.join(name))
            .find(|p| p.exists())
    }

    /// Load the dataset as normalized sessions.
    ///
    /// Reuses the formatted file unless `force` is set; otherwise prepares
    /// the raw file, normalizes it and rewrites the formatted file.
    pub fn load(&self) -> Result<Normalized> {
        let formatted = self.formatted_path();
        if formatted.exists() && !self.force {
            info!(
                "The dataset '{}' already exists in '{}' and will not be rebuilt.",
                self.dataset_id(),
                self.formatted_dir().display()
            );
            return read_canonical_csv(&formatted);
        }

        let raw_path = self.raw_path().ok_or_else(|| {
            let expected = self
                .source
                .raw_file_names()
                .into_iter()
                .next()
                .unwrap_or_default();
            EvError::DataPathNotFound(self.raw_dir().join(expected))
        })?;

        info!("Preparing dataset '{}' from {}", self.dataset_id(), raw_path.display());
        let raw = read_table(&raw_path, self.source.delimiter())?;
        let (table, mapping) = self.source.prepare(raw)?;
        let normalized = SchemaNormalizer::with_policy(mapping, self.policy)?.normalize(&table);

        write_canonical_csv(&formatted, &normalized.sessions)?;
        info!(
            "The dataset '{}' is saved as: {}",
            self.dataset_id(),
            formatted.display()
        );
        Ok(normalized)
    }
}

// ── DatasetRegistry ───────────────────────────────────────────────────────────

/// Maps dataset identifiers to their sources.
pub struct DatasetRegistry;

impl DatasetRegistry {
    /// Every identifier [`DatasetRegistry::source`] accepts.
    pub const DATASET_IDS: [&'static str; 4] = ["ASR", "ACN_Caltech", "ACN_JPL", "ACN_Office001"];

    pub fn source(dataset_id: &str) -> Result<Box<dyn DatasetSource>> {
        match dataset_id {
            "ASR" => Ok(Box::new(AsrSource)),
            "ACN_Caltech" | "ACN_JPL" | "ACN_Office001" => Ok(Box::new(AcnSource::new(dataset_id)?)),
            other => Err(EvError::UnknownDataset(other.to_string())),
        }
    }

    pub fn get_loader(dataset_id: &str, root: &Path, force: bool) -> Result<DatasetLoader> {
        Ok(DatasetLoader::new(Self::source(dataset_id)?, root, force))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
