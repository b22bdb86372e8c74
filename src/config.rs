//! TOML configuration: sources, pipelines, and their outputs.
//!
//! A config file names every source once (`[sources.<name>]`) and wires
//! sources into pipelines (`[pipelines.<name>]`). Relative paths resolve
//! against the directory holding the config file, so a project can be
//! moved around as a unit.

use anyhow::{Context, Result};
use recordflow_core::aggregate::AggregateSpec;
use recordflow_core::parse::{CsvFormat, JsonFormat, LineLogFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::sink::is_valid_identifier;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// What to do with a line or element that cannot become a record.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    #[default]
    Skip,
    Abort,
}

/// One `[sources.<name>]` table, tagged by `kind`.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    LineLog(LineLogSourceConfig),
    Csv(CsvSourceConfig),
    Json(JsonSourceConfig),
    Table(TableSourceConfig),
}

impl SourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::LineLog(_) => "line_log",
            SourceConfig::Csv(_) => "csv",
            SourceConfig::Json(_) => "json",
            SourceConfig::Table(_) => "table",
        }
    }

    /// The file, directory, or database this source reads.
    pub fn location(&self) -> &Path {
        match self {
            SourceConfig::LineLog(c) => &c.files.path,
            SourceConfig::Csv(c) => &c.files.path,
            SourceConfig::Json(c) => &c.files.path,
            SourceConfig::Table(c) => &c.database,
        }
    }

    fn resolve_paths(&mut self, base: &Path) {
        match self {
            SourceConfig::LineLog(c) => c.files.path = resolve(base, &c.files.path),
            SourceConfig::Csv(c) => c.files.path = resolve(base, &c.files.path),
            SourceConfig::Json(c) => c.files.path = resolve(base, &c.files.path),
            SourceConfig::Table(c) => c.database = resolve(base, &c.database),
        }
    }
}

/// Where a file-based source reads from. A directory expands into every
/// file matching `include_globs` and not matching `exclude_globs`.
#[derive(Debug, Deserialize, Clone)]
pub struct FileSelection {
    pub path: PathBuf,
    #[serde(default)]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LineLogSourceConfig {
    #[serde(flatten)]
    pub files: FileSelection,
    #[serde(default = "default_log_fields")]
    pub fields: Vec<String>,
    /// Empty string disables the rest field.
    #[serde(default = "default_rest_field")]
    pub rest_field: String,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub on_malformed: MalformedPolicy,
}

fn default_log_fields() -> Vec<String> {
    LineLogFormat::default().fields
}

fn default_rest_field() -> String {
    "message".to_string()
}

impl LineLogSourceConfig {
    pub fn format(&self) -> Result<LineLogFormat> {
        Ok(LineLogFormat {
            fields: self.fields.clone(),
            rest_field: if self.rest_field.is_empty() {
                None
            } else {
                Some(self.rest_field.clone())
            },
            delimiter: self
                .delimiter
                .as_deref()
                .map(single_char)
                .transpose()
                .context("line_log delimiter")?,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CsvSourceConfig {
    #[serde(flatten)]
    pub files: FileSelection,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default = "default_true")]
    pub infer_types: bool,
    #[serde(default)]
    pub on_malformed: MalformedPolicy,
}

fn default_true() -> bool {
    true
}

impl CsvSourceConfig {
    pub fn format(&self) -> Result<CsvFormat> {
        let delimiter = match self.delimiter.as_deref() {
            Some(d) => single_char(d).context("csv delimiter")?,
            None => CsvFormat::default().delimiter,
        };
        Ok(CsvFormat {
            delimiter,
            infer_types: self.infer_types,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct JsonSourceConfig {
    #[serde(flatten)]
    pub files: FileSelection,
    #[serde(default)]
    pub records_field: Option<String>,
    #[serde(default)]
    pub on_malformed: MalformedPolicy,
}

impl JsonSourceConfig {
    pub fn format(&self) -> JsonFormat {
        JsonFormat {
            records_field: self.records_field.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableSourceConfig {
    pub database: PathBuf,
    pub query: String,
    #[serde(default)]
    pub params: Vec<SqlParam>,
}

/// A positional query parameter. Bound with `.bind()`, never spliced
/// into the SQL text.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum SqlParam {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// One `[pipelines.<name>]` table.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub source: String,
    #[serde(default, rename = "where")]
    pub filters: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

/// What an output receives: the matching records or the metric summary.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputTarget {
    #[default]
    Records,
    Summary,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Table,
    Json,
    Csv,
    Sqlite,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default)]
    pub target: OutputTarget,
    pub format: OutputFormat,
    /// File destination for rendered formats; stdout when omitted.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub replace: bool,
}

impl OutputConfig {
    /// A rendered output written to stdout.
    pub fn stdout(target: OutputTarget, format: OutputFormat) -> Self {
        Self {
            target,
            format,
            path: None,
            database: None,
            table: None,
            replace: false,
        }
    }
}

fn single_char(s: &str) -> Result<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => anyhow::bail!("must be exactly one character, got '{}'", s),
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content).with_context(|| "Failed to parse config file")?;

    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base);

    Ok(config)
}

/// Parse and validate config text without touching the filesystem.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn resolve_paths(&mut self, base: &Path) {
        for source in self.sources.values_mut() {
            source.resolve_paths(base);
        }
        for pipeline in self.pipelines.values_mut() {
            for output in &mut pipeline.outputs {
                output.path = output.path.as_deref().map(|p| resolve(base, p));
                output.database = output.database.as_deref().map(|p| resolve(base, p));
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, source) in &self.sources {
            match source {
                SourceConfig::LineLog(c) => {
                    if c.fields.is_empty() {
                        anyhow::bail!("sources.{}.fields must not be empty", name);
                    }
                    let mut seen = std::collections::HashSet::new();
                    for field in &c.fields {
                        if !seen.insert(field.as_str()) {
                            anyhow::bail!("sources.{}.fields repeats '{}'", name, field);
                        }
                    }
                    if seen.contains(c.rest_field.as_str()) {
                        anyhow::bail!(
                            "sources.{}.rest_field '{}' collides with a token field",
                            name,
                            c.rest_field
                        );
                    }
                    c.format()
                        .with_context(|| format!("sources.{}", name))?;
                }
                SourceConfig::Csv(c) => {
                    c.format().with_context(|| format!("sources.{}", name))?;
                }
                SourceConfig::Json(c) => {
                    if c.records_field.as_deref() == Some("") {
                        anyhow::bail!("sources.{}.records_field must not be empty", name);
                    }
                }
                SourceConfig::Table(c) => {
                    if c.query.trim().is_empty() {
                        anyhow::bail!("sources.{}.query must not be empty", name);
                    }
                }
            }
        }

        for (name, pipeline) in &self.pipelines {
            if !self.sources.contains_key(&pipeline.source) {
                anyhow::bail!(
                    "pipelines.{} references unknown source '{}'",
                    name,
                    pipeline.source
                );
            }
            AggregateSpec::parse(&pipeline.metrics, &pipeline.filters)
                .with_context(|| format!("pipelines.{}", name))?;

            for (i, output) in pipeline.outputs.iter().enumerate() {
                validate_output(output)
                    .with_context(|| format!("pipelines.{}.outputs[{}]", name, i))?;
                if output.target == OutputTarget::Summary && pipeline.metrics.is_empty() {
                    anyhow::bail!(
                        "pipelines.{}.outputs[{}] targets the summary but the pipeline has no metrics",
                        name,
                        i
                    );
                }
            }
        }

        validate_log_level(&self.log.level)?;

        Ok(())
    }
}

/// Accepts the levels `[log] level` and `--log-level` understand.
pub fn validate_log_level(level: &str) -> Result<()> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(()),
        other => anyhow::bail!(
            "Unknown log level: '{}'. Must be trace, debug, info, warn, error, or off.",
            other
        ),
    }
}

fn validate_output(output: &OutputConfig) -> Result<()> {
    match output.format {
        OutputFormat::Sqlite => {
            if output.target != OutputTarget::Records {
                anyhow::bail!("sqlite outputs must target records");
            }
            if output.database.is_none() {
                anyhow::bail!("sqlite outputs need a database");
            }
            match output.table.as_deref() {
                Some(table) if is_valid_identifier(table) => {}
                Some(table) => anyhow::bail!("'{}' is not a valid table name", table),
                None => anyhow::bail!("sqlite outputs need a table"),
            }
            if output.path.is_some() {
                anyhow::bail!("sqlite outputs take database, not path");
            }
        }
        OutputFormat::Csv | OutputFormat::Table => {
            if output.target != OutputTarget::Records {
                anyhow::bail!("{} outputs must target records", output.format.as_str());
            }
        }
        OutputFormat::Text | OutputFormat::Json => {}
    }
    if output.format != OutputFormat::Sqlite && (output.database.is_some() || output.table.is_some())
    {
        anyhow::bail!("only sqlite outputs take database and table");
    }
    Ok(())
}
