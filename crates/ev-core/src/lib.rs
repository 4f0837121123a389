//! Core domain of the EV charging analysis workspace.
//!
//! Holds the canonical [`models::ChargingSession`] record, the field mapping
//! configuration, the schema normalizer that maps raw tables onto the
//! canonical schema, and the statistics and formatting helpers shared by the
//! analysis and reporting layers.

pub mod data_processors;
pub mod error;
pub mod formatting;
pub mod mapping;
pub mod models;
pub mod normalizer;
pub mod settings;
pub mod stats;

pub use error::{EvError, Result};
pub use mapping::{FieldMapping, NormalizationPolicy};
pub use models::{ChargingSession, RawRow, RawTable, RawValue};
pub use normalizer::{normalize, Normalized, RowError, RowErrorKind, RowFailure, SchemaNormalizer};
