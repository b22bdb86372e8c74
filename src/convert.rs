//! Re-serialize a source as JSON or CSV.
//!
//! Covers the usual conversions between the supported formats: CSV to
//! JSON, JSON to CSV, and line logs or table rows to either. Output is
//! the same text `render_json` / `render_csv` produce, so a converted
//! file loads back through the matching source unchanged.

use anyhow::{Context, Result};
use recordflow_core::render::{render_csv, render_json};
use std::path::Path;

use crate::sink::{self, Destination};
use crate::traits::RecordSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConvertFormat {
    Json,
    Csv,
}

impl ConvertFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConvertFormat::Json => "json",
            ConvertFormat::Csv => "csv",
        }
    }
}

/// Convert every record of `source`.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping. Returns the number of records written.
pub async fn run_convert(
    source: &dyn RecordSource,
    to: ConvertFormat,
    output: Option<&Path>,
) -> Result<usize> {
    let outcome = source
        .load()
        .await
        .with_context(|| format!("loading source '{}'", source.name()))?;

    let rendered = match to {
        ConvertFormat::Json => render_json(&outcome.records)?,
        ConvertFormat::Csv => render_csv(&outcome.records)?,
    };
    let destination = Destination::from_path(output.map(Path::to_path_buf));
    sink::write(&destination, &rendered)?;

    if let Destination::File(path) = &destination {
        eprintln!(
            "Converted {} records from {} ({}) to {} at {}",
            outcome.records.len(),
            source.name(),
            source.kind(),
            to.as_str(),
            path.display()
        );
    }
    if outcome.skipped_count() > 0 {
        eprintln!("  skipped: {}", outcome.skipped_count());
    }

    Ok(outcome.records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_fs::FileSource;
    use recordflow_core::parse::{CsvFormat, JsonFormat};
    use tempfile::TempDir;

    #[tokio::test]
    async fn csv_to_json_and_back() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("grades.csv");
        std::fs::write(&csv_path, "name,grade\nAlice,85\nBob,92\n").unwrap();

        let json_path = dir.path().join("out/grades.json");
        let csv_source = FileSource::csv("grades", &csv_path, CsvFormat::default());
        let n = run_convert(&csv_source, ConvertFormat::Json, Some(json_path.as_path()))
            .await
            .unwrap();
        assert_eq!(n, 2);

        let back_path = dir.path().join("out/grades.csv");
        let json_source = FileSource::json("grades_json", &json_path, JsonFormat::default());
        run_convert(&json_source, ConvertFormat::Csv, Some(back_path.as_path()))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&back_path).unwrap(),
            "name,grade\nAlice,85\nBob,92\n"
        );
    }

    #[tokio::test]
    async fn nested_json_cannot_become_csv() {
        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("intel.json");
        std::fs::write(&json_path, r#"[{"ip": "10.0.0.1", "tags": ["tor"]}]"#).unwrap();
        let source = FileSource::json("intel", &json_path, JsonFormat::default());
        let out = dir.path().join("intel.csv");
        assert!(run_convert(&source, ConvertFormat::Csv, Some(out.as_path())).await.is_err());
    }
}
