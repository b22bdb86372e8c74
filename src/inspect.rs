//! `rflow inspect`: load a source and show what came out of it.

use anyhow::{Context, Result};
use recordflow_core::render::{render_json, render_table, render_text};

use crate::traits::RecordSource;

/// How `inspect` prints records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InspectFormat {
    Text,
    Table,
    Json,
}

/// Skipped entries listed individually before the rest are summarized.
const SKIPPED_SHOWN: usize = 10;

/// Load `source` and print up to `limit` records on stdout. Counts and
/// skipped entries go to stderr.
pub async fn run_inspect(
    source: &dyn RecordSource,
    limit: Option<usize>,
    format: InspectFormat,
) -> Result<()> {
    let outcome = source
        .load()
        .await
        .with_context(|| format!("loading source '{}'", source.name()))?;

    let shown = match limit {
        Some(n) => outcome.records.head(n),
        None => outcome.records.clone(),
    };
    let rendered = match format {
        InspectFormat::Text => render_text(&shown),
        InspectFormat::Table => render_table(&shown),
        InspectFormat::Json => render_json(&shown)?,
    };
    print!("{}", rendered);
    if format == InspectFormat::Json {
        println!();
    }

    eprintln!(
        "{} ({}) {}: {} records, {} skipped",
        source.name(),
        source.kind(),
        source.location(),
        outcome.records.len(),
        outcome.skipped_count()
    );
    for entry in outcome.skipped.iter().take(SKIPPED_SHOWN) {
        eprintln!("  {}:{}: {}", entry.location, entry.line, entry.reason);
    }
    if outcome.skipped_count() > SKIPPED_SHOWN {
        eprintln!("  ... and {} more", outcome.skipped_count() - SKIPPED_SHOWN);
    }

    Ok(())
}
