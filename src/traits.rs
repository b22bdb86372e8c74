//! Extension trait for record sources.
//!
//! Every configured source (line log, CSV, JSON, SQLite table) implements
//! [`RecordSource`]. The [`SourceRegistry`] resolves sources by name for
//! the pipeline runner; embedders can register their own sources next to
//! the configured ones.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              SourceRegistry              │
//! │  ┌─────────┐ ┌─────────┐ ┌────────────┐ │
//! │  │  Files  │ │  Table  │ │  Custom    │ │
//! │  │log/csv/ │ │ (SQLite)│ │  (Rust)    │ │
//! │  │  json   │ │         │ │            │ │
//! │  └─────────┘ └─────────┘ └────────────┘ │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!        run_pipeline() → filter → aggregate → sinks
//! ```
//!
//! # Usage
//!
//! ```rust
//! use recordflow::config::Config;
//! use recordflow::traits::SourceRegistry;
//!
//! let config = Config::default();
//! let mut sources = SourceRegistry::from_config(&config).unwrap();
//! // sources.register(Box::new(MySource::new()));
//! assert!(sources.is_empty());
//! ```

use async_trait::async_trait;
use recordflow_core::error::Result;
use recordflow_core::models::LoadOutcome;

use crate::config::{Config, SourceConfig};
use crate::source_fs::FileSource;
use crate::source_table::TableSource;

/// A named producer of records.
///
/// [`load`](RecordSource::load) reads the whole source before returning.
/// Lines or elements that cannot become records are reported in the
/// outcome's `skipped` list rather than failing the load; structural
/// problems fail it.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use recordflow::traits::RecordSource;
/// use recordflow_core::error::Result;
/// use recordflow_core::models::{LoadOutcome, Record, RecordSequence};
///
/// pub struct Fixed;
///
/// #[async_trait]
/// impl RecordSource for Fixed {
///     fn name(&self) -> &str { "fixed" }
///     fn kind(&self) -> &str { "custom" }
///     fn location(&self) -> String { "memory".to_string() }
///
///     async fn load(&self) -> Result<LoadOutcome> {
///         let records = RecordSequence::new(vec![Record::from_pairs([("n", 1i64)])]);
///         Ok(LoadOutcome { records, skipped: vec![] })
///     }
/// }
/// ```
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Name used in config and on the command line.
    fn name(&self) -> &str;

    /// Short type label (`"line_log"`, `"csv"`, `"json"`, `"table"`, ...).
    fn kind(&self) -> &str;

    /// Human-readable location for diagnostics.
    fn location(&self) -> String;

    async fn load(&self) -> Result<LoadOutcome>;
}

/// Sources addressable by name.
pub struct SourceRegistry {
    sources: Vec<Box<dyn RecordSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Build a registry holding every `[sources.<name>]` entry.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        for (name, source) in &config.sources {
            registry.register(build_source(name, source)?);
        }
        Ok(registry)
    }

    /// Register a source. A later source with the same name shadows an
    /// earlier one.
    pub fn register(&mut self, source: Box<dyn RecordSource>) {
        self.sources.retain(|s| s.name() != source.name());
        self.sources.push(source);
    }

    pub fn get(&self, name: &str) -> Option<&dyn RecordSource> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn one config entry into a source.
pub fn build_source(name: &str, config: &SourceConfig) -> anyhow::Result<Box<dyn RecordSource>> {
    let source: Box<dyn RecordSource> = match config {
        SourceConfig::LineLog(c) => Box::new(
            FileSource::line_log(name, &c.files.path, c.format()?)
                .with_globs(c.files.include_globs.clone(), c.files.exclude_globs.clone())
                .with_policy(c.on_malformed),
        ),
        SourceConfig::Csv(c) => Box::new(
            FileSource::csv(name, &c.files.path, c.format()?)
                .with_globs(c.files.include_globs.clone(), c.files.exclude_globs.clone())
                .with_policy(c.on_malformed),
        ),
        SourceConfig::Json(c) => Box::new(
            FileSource::json(name, &c.files.path, c.format())
                .with_globs(c.files.include_globs.clone(), c.files.exclude_globs.clone())
                .with_policy(c.on_malformed),
        ),
        SourceConfig::Table(c) => Box::new(TableSource::from_config(name, c)),
    };
    Ok(source)
}
