//! Data layer for EV charging analysis.
//!
//! Reads raw session files, prepares the public datasets for normalization,
//! caches the canonical tables and computes the exploratory statistics.

pub mod aggregator;
pub mod analysis;
pub mod engagement;
pub mod reader;
pub mod sources;

pub use ev_core as core;
