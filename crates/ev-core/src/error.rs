use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors produced by the EV charging analysis crates.
///
/// Per-row problems found while normalizing a table are never reported
/// through this type; see [`crate::normalizer::RowError`].
#[derive(Error, Debug)]
pub enum EvError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be created or written.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A delimited-text file could not be read or written.
    #[error("CSV error in {path}: {message}")]
    Csv { path: PathBuf, message: String },

    /// The field mapping or another configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The expected data file or directory does not exist.
    #[error("Data path not found: {0}")]
    DataPathNotFound(PathBuf),

    /// No loader is registered for the requested dataset identifier.
    #[error("No loader defined for dataset: {0}")]
    UnknownDataset(String),

    /// A raw dataset does not have the shape its loader expects.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the EV crates.
pub type Result<T> = std::result::Result<T, EvError>;
