//! Raw dataset reading and canonical table writing.
//!
//! Readers turn delimited-text and JSON exports into [`RawTable`]s for the
//! normalizer; the writer persists normalized sessions with the canonical
//! column names.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ev_core::data_processors::DataConverter;
use ev_core::error::{EvError, Result};
use ev_core::mapping::FieldMapping;
use ev_core::models::{ChargingSession, RawRow, RawTable, RawValue};
use ev_core::normalizer::{Normalized, SchemaNormalizer};
use tracing::{debug, warn};

// ── Public API ────────────────────────────────────────────────────────────────

/// Find all `.csv` and `.json` files recursively under `dir`, sorted by path.
pub fn find_dataset_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Data path does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_dataset_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Read a raw table, choosing the reader from the file extension.
///
/// `.json` files go through [`read_json_table`]; everything else is treated
/// as delimited text.
pub fn read_table(path: &Path, delimiter: u8) -> Result<RawTable> {
    if has_extension(path, "json") {
        read_json_table(path)
    } else {
        read_csv_table(path, delimiter)
    }
}

/// Read a delimited-text file with a header row.
///
/// Every cell becomes [`RawValue::Text`] except empty cells, which become
/// [`RawValue::Null`]. Short rows simply lack the trailing columns; surplus
/// cells are ignored.
pub fn read_csv_table(path: &Path, delimiter: u8) -> Result<RawTable> {
    let file = open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.trim().to_string()
        })
        .collect();

    let mut rows: Vec<RawRow> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let row: RawRow = columns
            .iter()
            .zip(record.iter())
            .map(|(column, cell)| {
                let value = if cell.is_empty() {
                    RawValue::Null
                } else {
                    RawValue::Text(cell.to_string())
                };
                (column.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    debug!(
        "Read {} rows x {} columns from {}",
        rows.len(),
        columns.len(),
        path.display()
    );
    Ok(RawTable::new(columns, rows))
}

/// Read a JSON export: either an array of objects or an object whose
/// `_items` field is such an array (the ACN API page shape).
///
/// Nested objects are flattened into dotted column names.
pub fn read_json_table(path: &Path) -> Result<RawTable> {
    let file = open(path)?;
    let document: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;

    let items = match &document {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => match map.get("_items") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(EvError::Dataset(format!(
                    "{}: expected an array or an object with an \"_items\" array",
                    path.display()
                )))
            }
        },
        _ => {
            return Err(EvError::Dataset(format!(
                "{}: expected an array of records",
                path.display()
            )))
        }
    };

    let mut rows: Vec<RawRow> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        if !item.is_object() {
            return Err(EvError::Dataset(format!(
                "{}: record {} is not an object",
                path.display(),
                i
            )));
        }
        let row: RawRow = DataConverter::flatten_nested(item, "")
            .iter()
            .map(|(k, v)| (k.clone(), RawValue::from(v)))
            .collect();
        rows.push(row);
    }

    debug!("Read {} records from {}", rows.len(), path.display());
    Ok(RawTable::from_rows(rows))
}

/// Write sessions as a canonical CSV file, creating parent directories.
pub fn write_canonical_csv(path: &Path, sessions: &[ChargingSession]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path).map_err(|e| EvError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut writer = csv::Writer::from_writer(file);
    if sessions.is_empty() {
        writer
            .write_record(ev_core::models::CANONICAL_COLUMNS)
            .map_err(|e| csv_error(path, e))?;
    }
    for session in sessions {
        writer.serialize(session).map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;

    debug!("Wrote {} sessions to {}", sessions.len(), path.display());
    Ok(())
}

/// Read a canonical CSV file back through the normalizer.
pub fn read_canonical_csv(path: &Path) -> Result<Normalized> {
    let table = read_csv_table(path, b',')?;
    let mapping = FieldMapping::canonical();

    let missing: Vec<&str> = ev_core::models::CANONICAL_COLUMNS
        .into_iter()
        .filter(|c| !table.has_column(c))
        .collect();
    if !missing.is_empty() {
        warn!(
            "{} is missing canonical columns {:?}",
            path.display(),
            missing
        );
    }

    Ok(SchemaNormalizer::new(mapping)?.normalize(&table))
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EvError::DataPathNotFound(path.to_path_buf())
        } else {
            EvError::FileRead {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}

fn csv_error(path: &Path, e: csv::Error) -> EvError {
    EvError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn is_dataset_file(path: &Path) -> bool {
    has_extension(path, "csv") || has_extension(path, "json")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn session(id: &str, day: u32, kwh: f64) -> ChargingSession {
        let start = NaiveDate::from_ymd_opt(2023, 3, day)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let end = start + chrono::Duration::hours(2);
        ChargingSession::try_new(id, start, end, kwh).unwrap()
    }

    // ── find_dataset_files ────────────────────────────────────────────────────

    #[test]
    fn test_find_dataset_files_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("raw");
        std::fs::create_dir_all(&sub).unwrap();
        write_file(dir.path(), "b.csv", "x");
        write_file(&sub, "a.json", "[]");
        write_file(dir.path(), "notes.txt", "x");

        let files = find_dataset_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files[0] < files[1]);
    }

    #[test]
    fn test_find_dataset_files_nonexistent_path() {
        assert!(find_dataset_files(Path::new("/tmp/does-not-exist-ev-eda-xyz")).is_empty());
    }

    // ── read_csv_table ────────────────────────────────────────────────────────

    #[test]
    fn test_read_csv_table_basic() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "raw.csv",
            "id,s,e,kwh\nEV1,2023-01-01 08:00,2023-01-01 10:00,5.0\nEV2,,2023-01-02 10:00,1\n",
        );

        let table = read_csv_table(&path, b',').unwrap();
        assert_eq!(table.columns, vec!["id", "s", "e", "kwh"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0]["kwh"], RawValue::Text("5.0".into()));
        assert_eq!(table.rows[1]["s"], RawValue::Null);
    }

    #[test]
    fn test_read_csv_table_semicolon_and_bom() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "asr.csv", "\u{feff}EV_id_x;total_energy\nA;1,5\n");

        let table = read_csv_table(&path, b';').unwrap();
        assert_eq!(table.columns, vec!["EV_id_x", "total_energy"]);
        assert_eq!(table.rows[0]["total_energy"], RawValue::Text("1,5".into()));
    }

    #[test]
    fn test_read_csv_table_short_row_lacks_columns() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "raw.csv", "a,b,c\n1,2\n");

        let table = read_csv_table(&path, b',').unwrap();
        assert!(table.rows[0].contains_key("b"));
        assert!(!table.rows[0].contains_key("c"));
    }

    #[test]
    fn test_read_csv_table_missing_file() {
        let err = read_csv_table(Path::new("/tmp/no-such-ev-file.csv"), b',').unwrap_err();
        assert!(matches!(err, EvError::DataPathNotFound(_)));
    }

    // ── read_json_table ───────────────────────────────────────────────────────

    #[test]
    fn test_read_json_table_array() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "raw.json",
            r#"[{"id": "EV1", "kwh": 4.5, "meta": {"site": "x"}}, {"id": 7, "kwh": null}]"#,
        );

        let table = read_json_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0]["kwh"], RawValue::Number(4.5));
        assert_eq!(table.rows[0]["meta.site"], RawValue::Text("x".into()));
        assert_eq!(table.rows[1]["id"], RawValue::Number(7.0));
        assert_eq!(table.rows[1]["kwh"], RawValue::Null);
        assert!(table.has_column("meta.site"));
    }

    #[test]
    fn test_read_json_table_items_object() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "acn.json",
            r#"{"_meta": {"total": 1}, "_items": [{"userID": 12}]}"#,
        );
        let table = read_json_table(&path).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_read_json_table_rejects_scalars() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "bad.json", "[1, 2]");
        assert!(matches!(read_json_table(&path), Err(EvError::Dataset(_))));

        let path = write_file(dir.path(), "bad2.json", r#"{"rows": []}"#);
        assert!(matches!(read_json_table(&path), Err(EvError::Dataset(_))));
    }

    #[test]
    fn test_read_json_table_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "broken.json", "{not json");
        assert!(matches!(read_json_table(&path), Err(EvError::JsonParse(_))));
    }

    #[test]
    fn test_read_table_dispatches_on_extension() {
        let dir = TempDir::new().unwrap();
        let json = write_file(dir.path(), "a.JSON", r#"[{"x": 1}]"#);
        let csv = write_file(dir.path(), "b.csv", "x\n1\n");
        assert_eq!(read_table(&json, b',').unwrap().rows[0]["x"], RawValue::Number(1.0));
        assert_eq!(read_table(&csv, b',').unwrap().rows[0]["x"], RawValue::Text("1".into()));
    }

    // ── canonical files ───────────────────────────────────────────────────────

    #[test]
    fn test_write_canonical_csv_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("formatted").join("asr.csv");
        write_canonical_csv(&path, &[session("EV1", 1, 5.0)]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("EV_id_x,start_datetime,end_datetime,total_energy")
        );
        assert_eq!(
            lines.next(),
            Some("EV1,2023-03-01 08:00:00,2023-03-01 10:00:00,5.0")
        );
    }

    #[test]
    fn test_write_canonical_csv_empty_has_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        write_canonical_csv(&path, &[]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.trim(),
            "EV_id_x,start_datetime,end_datetime,total_energy"
        );
    }

    #[test]
    fn test_write_canonical_csv_reports_write_failure() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened as a file for writing.
        let err = write_canonical_csv(dir.path(), &[session("EV1", 1, 5.0)]).unwrap_err();
        assert!(matches!(err, EvError::FileWrite { .. }));
        assert!(err.to_string().starts_with("Failed to write file"));
    }

    #[test]
    fn test_canonical_csv_reads_back_identical_sessions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.csv");
        let sessions = vec![session("EV1", 1, 5.0), session("EV2", 2, 0.25)];
        write_canonical_csv(&path, &sessions).unwrap();

        let normalized = read_canonical_csv(&path).unwrap();
        assert!(normalized.failures.is_empty());
        assert_eq!(normalized.sessions, sessions);
    }
}
