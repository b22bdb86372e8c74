//! File-backed sources: line logs, CSV, and JSON.
//!
//! A source path may be a single file or a directory. A directory is
//! walked recursively; files whose relative path matches `include_globs`
//! and none of `exclude_globs` are parsed in sorted order and their
//! records concatenated into one sequence.

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use recordflow_core::error::{PipelineError, Result};
use recordflow_core::models::LoadOutcome;
use recordflow_core::parse::{parse_csv, parse_json, parse_line_log, CsvFormat, JsonFormat, LineLogFormat};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::MalformedPolicy;
use crate::traits::RecordSource;

/// How the files of a source are parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum FileFormat {
    LineLog(LineLogFormat),
    Csv(CsvFormat),
    Json(JsonFormat),
}

impl FileFormat {
    pub fn kind(&self) -> &'static str {
        match self {
            FileFormat::LineLog(_) => "line_log",
            FileFormat::Csv(_) => "csv",
            FileFormat::Json(_) => "json",
        }
    }

    /// Globs used for a directory when none are configured.
    fn default_includes(&self) -> Vec<String> {
        let patterns: &[&str] = match self {
            FileFormat::LineLog(_) => &["**/*.log", "**/*.txt"],
            FileFormat::Csv(_) => &["**/*.csv"],
            FileFormat::Json(_) => &["**/*.json"],
        };
        patterns.iter().map(|p| p.to_string()).collect()
    }

    fn parse(&self, text: &str, location: &str) -> Result<LoadOutcome> {
        match self {
            FileFormat::LineLog(f) => Ok(parse_line_log(text, f, location)),
            FileFormat::Csv(f) => parse_csv(text, f, location),
            FileFormat::Json(f) => parse_json(text, f, location),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
    format: FileFormat,
    include_globs: Vec<String>,
    exclude_globs: Vec<String>,
    policy: MalformedPolicy,
}

impl FileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            format,
            include_globs: Vec::new(),
            exclude_globs: Vec::new(),
            policy: MalformedPolicy::Skip,
        }
    }

    pub fn line_log(name: impl Into<String>, path: impl Into<PathBuf>, format: LineLogFormat) -> Self {
        Self::new(name, path, FileFormat::LineLog(format))
    }

    pub fn csv(name: impl Into<String>, path: impl Into<PathBuf>, format: CsvFormat) -> Self {
        Self::new(name, path, FileFormat::Csv(format))
    }

    pub fn json(name: impl Into<String>, path: impl Into<PathBuf>, format: JsonFormat) -> Self {
        Self::new(name, path, FileFormat::Json(format))
    }

    pub fn with_globs(mut self, include: Vec<String>, exclude: Vec<String>) -> Self {
        self.include_globs = include;
        self.exclude_globs = exclude;
        self
    }

    pub fn with_policy(mut self, policy: MalformedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse every file of the source.
    pub fn load_files(&self) -> Result<LoadOutcome> {
        let files = self.collect_files()?;
        let mut outcome = LoadOutcome::default();
        for file in &files {
            let location = file.display().to_string();
            let text = read_text(file)?;
            let parsed = self.format.parse(&text, &location)?;
            debug!(
                file = %location,
                records = parsed.records.len(),
                skipped = parsed.skipped_count(),
                "file parsed"
            );
            outcome.extend(parsed);
        }

        match self.policy {
            MalformedPolicy::Skip => Ok(outcome),
            MalformedPolicy::Abort => outcome.reject_skipped(),
        }
    }

    fn collect_files(&self) -> Result<Vec<PathBuf>> {
        let location = self.path.display().to_string();
        let metadata =
            std::fs::metadata(&self.path).map_err(|e| PipelineError::from_io(&location, &e))?;
        if !metadata.is_dir() {
            return Ok(vec![self.path.clone()]);
        }

        let includes = if self.include_globs.is_empty() {
            self.format.default_includes()
        } else {
            self.include_globs.clone()
        };
        let include_set = build_globset(&includes, &location)?;
        let exclude_set = build_globset(&self.exclude_globs, &location)?;

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.path) {
            let entry = entry.map_err(|e| PipelineError::SourceAccess {
                location: location.clone(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.path).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }
            files.push(path.to_path_buf());
        }

        // Sort for deterministic ordering
        files.sort();

        if files.is_empty() {
            warn!(source = %self.name, directory = %location, "no files matched");
        }
        Ok(files)
    }
}

#[async_trait]
impl RecordSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        self.format.kind()
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<LoadOutcome> {
        self.load_files()
    }
}

fn read_text(path: &Path) -> Result<String> {
    let location = path.display().to_string();
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            PipelineError::format(location, None, "not valid UTF-8")
        } else {
            PipelineError::from_io(location, &e)
        }
    })
}

fn build_globset(patterns: &[String], location: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| PipelineError::SourceAccess {
            location: location.to_string(),
            reason: format!("bad glob '{}': {}", pattern, e),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| PipelineError::SourceAccess {
        location: location.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordflow_core::models::Value;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_single_csv_file() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "grades.csv", "name,grade\nAlice,85\nBob,92\n");
        let source = FileSource::csv("grades", &path, CsvFormat::default());
        let outcome = source.load_files().unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(
            outcome.records.get(1).unwrap().get("grade"),
            Some(&Value::Int(92))
        );
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let source = FileSource::json("x", dir.path().join("nope.json"), JsonFormat::default());
        assert!(matches!(
            source.load_files(),
            Err(PipelineError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.log");
        std::fs::write(&path, [0xff, 0xfe, b'\n']).unwrap();
        let source = FileSource::line_log("x", &path, LineLogFormat::default());
        assert!(matches!(
            source.load_files(),
            Err(PipelineError::SourceFormat { .. })
        ));
    }

    #[test]
    fn directory_batch_in_sorted_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b/day2.log", "2024-01-02 ERROR disk full\n");
        write(dir.path(), "a/day1.log", "2024-01-01 INFO boot\nbroken\n");
        write(dir.path(), "notes.md", "ignored\n");
        write(dir.path(), "old/day0.log", "2023-12-31 INFO old\n");

        let source = FileSource::line_log("logs", dir.path(), LineLogFormat::default())
            .with_globs(vec![], vec!["old/**".to_string()]);
        let outcome = source.load_files().unwrap();

        let timestamps: Vec<_> = outcome
            .records
            .iter()
            .map(|r| r.get("timestamp").unwrap().render())
            .collect();
        assert_eq!(timestamps, vec!["2024-01-01", "2024-01-02"]);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(outcome.skipped[0].location.ends_with("day1.log"));
        assert_eq!(outcome.skipped[0].line, 2);
    }

    #[test]
    fn custom_include_globs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "feed.data", "[{\"ip\": \"10.0.0.1\"}]");
        write(dir.path(), "other.json", "[{\"ip\": \"10.0.0.2\"}]");
        let source = FileSource::json("intel", dir.path(), JsonFormat::default())
            .with_globs(vec!["*.data".to_string()], vec![]);
        let outcome = source.load_files().unwrap();
        assert_eq!(outcome.records.len(), 1);
    }

    #[test]
    fn abort_policy_rejects_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "app.log", "2024-01-01 INFO ok\nbroken\n");
        let source = FileSource::line_log("x", &path, LineLogFormat::default())
            .with_policy(MalformedPolicy::Abort);
        match source.load_files() {
            Err(PipelineError::SourceFormat { line, .. }) => assert_eq!(line, Some(2)),
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn bad_glob_is_reported() {
        let dir = TempDir::new().unwrap();
        let source = FileSource::csv("x", dir.path(), CsvFormat::default())
            .with_globs(vec!["[".to_string()], vec![]);
        assert!(matches!(
            source.load_files(),
            Err(PipelineError::SourceAccess { .. })
        ));
    }
}
