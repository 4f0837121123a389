mod bootstrap;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use ev_core::normalizer::{Normalized, SchemaNormalizer};
use ev_core::settings::Settings;
use ev_data::reader::{read_table, write_canonical_csv};
use ev_data::sources::DatasetRegistry;
use tracing::{debug, info, warn};

fn main() -> Result<()> {
    let settings = Settings::parse();

    bootstrap::setup_logging(settings.effective_log_level(), settings.log_file.as_deref())?;

    info!("ev-eda v{} starting", env!("CARGO_PKG_VERSION"));

    let normalized = load_sessions(&settings)?;
    report_failures(&normalized);

    if let Some(path) = &settings.export {
        write_canonical_csv(path, &normalized.sessions)
            .with_context(|| format!("exporting sessions to {}", path.display()))?;
        info!(
            "Exported {} sessions to {}",
            normalized.sessions.len(),
            path.display()
        );
    }

    let output = report::render(settings.view, &normalized, settings.bins as usize)?;
    print!("{}", output);
    Ok(())
}

/// Load a registered dataset or normalize the `--input` file.
fn load_sessions(settings: &Settings) -> Result<Normalized> {
    if let Some(id) = &settings.dataset {
        let loader = DatasetRegistry::get_loader(id, &settings.data_dir, settings.force)?
            .with_policy(settings.policy());
        return loader
            .load()
            .with_context(|| format!("loading dataset {}", id));
    }

    let path = settings
        .input
        .as_ref()
        .context("either --dataset or --input is required")?;

    // Mapping problems abort before any row is read.
    let normalizer = SchemaNormalizer::with_policy(settings.field_mapping()?, settings.policy())?;
    let table = read_table(path, settings.delimiter_byte()?)
        .with_context(|| format!("reading {}", path.display()))?;
    info!("Read {} rows from {}", table.len(), path.display());

    Ok(normalizer.normalize(&table))
}

fn report_failures(normalized: &Normalized) {
    if normalized.failures.is_empty() {
        info!("Normalized {} sessions", normalized.sessions.len());
        return;
    }

    warn!(
        "{} of {} rows failed normalization ({:.1}%)",
        normalized.failures.len(),
        normalized.rows_processed(),
        normalized.failure_rate() * 100.0
    );
    for (kind, count) in normalized.failure_counts() {
        warn!("  {}: {}", kind, count);
    }
    for failure in &normalized.failures {
        debug!("row {}: {}", failure.row_index, failure.message());
    }
}
