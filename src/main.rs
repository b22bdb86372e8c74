//! # recordflow CLI (`rflow`)
//!
//! ## Usage
//!
//! ```bash
//! rflow --config ./config/rflow.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rflow sources` | List configured sources and whether they exist |
//! | `rflow inspect <source>` | Print the records a source yields |
//! | `rflow run <pipeline>` | Run a configured pipeline end to end |
//! | `rflow query <source>` | Ad-hoc filter/aggregate from the command line |
//! | `rflow convert <source> --to json\|csv` | Re-serialize a source |
//! | `rflow completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Students with a grade of at least 80, and their average
//! rflow query grades --where "grade >= 80" --metric count --metric average:grade
//!
//! # Error breakdown of a security log as JSON
//! rflow query security --metric count_by:level --format json
//!
//! # Run the "passing" pipeline without writing anything
//! rflow run passing --dry-run
//!
//! # CSV to JSON
//! rflow convert grades --to json -o out/grades.json
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use recordflow::config::{self, OutputConfig, OutputFormat, OutputTarget};
use recordflow::convert::{self, ConvertFormat};
use recordflow::inspect::{self, InspectFormat};
use recordflow::logging;
use recordflow::pipeline::{self, Plan, RunOptions};
use recordflow::progress::{NoProgress, ProgressMode};
use recordflow::sources;
use recordflow::traits::{RecordSource, SourceRegistry};
use recordflow_core::aggregate::AggregateSpec;

/// recordflow: load records, filter and aggregate them, write reports.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file that declares sources and pipelines.
#[derive(Parser)]
#[command(
    name = "rflow",
    about = "Load records from logs, CSV, JSON or SQLite; filter, aggregate, and report",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rflow.toml`. Relative paths inside the file
    /// resolve against its directory.
    #[arg(long, global = true, default_value = "./config/rflow.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides `[log] level`;
    /// `RUST_LOG` overrides both.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured sources and whether their locations exist.
    Sources,

    /// Load a source and print its records.
    ///
    /// Record and skipped counts, plus the first skipped lines, are
    /// printed on stderr.
    Inspect {
        /// Source name from the config.
        source: String,

        /// Print at most this many records.
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, value_enum, default_value = "text")]
        format: InspectFormat,
    },

    /// Run a configured pipeline.
    Run {
        /// Pipeline name from the config.
        pipeline: String,

        /// Load, filter and aggregate, but write no outputs.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Filter and aggregate a source without a configured pipeline.
    ///
    /// Prints matching records, or the metric summary when `--metric` is
    /// given.
    Query {
        /// Source name from the config.
        source: String,

        /// Filter expression, e.g. `grade >= 80` or `level == ERROR`.
        /// Repeat to AND several.
        #[arg(long = "where", value_name = "EXPR")]
        filters: Vec<String>,

        /// Metric, e.g. `count`, `count_by:level`, `average:grade`, `top5:src_ip`.
        /// Repeatable.
        #[arg(long = "metric", value_name = "METRIC")]
        metrics: Vec<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: QueryFormat,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-serialize a source as JSON or CSV.
    Convert {
        /// Source name from the config.
        source: String,

        #[arg(long, value_enum)]
        to: ConvertFormat,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum QueryFormat {
    Text,
    Table,
    Json,
    Csv,
}

impl From<QueryFormat> for OutputFormat {
    fn from(f: QueryFormat) -> Self {
        match f {
            QueryFormat::Text => OutputFormat::Text,
            QueryFormat::Table => OutputFormat::Table,
            QueryFormat::Json => OutputFormat::Json,
            QueryFormat::Csv => OutputFormat::Csv,
        }
    }
}

fn lookup<'a>(registry: &'a SourceRegistry, name: &str) -> Result<&'a dyn RecordSource> {
    registry.get(name).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown source: '{}'. Configured sources: {}",
            name,
            if registry.is_empty() {
                "(none)".to_string()
            } else {
                registry.names().join(", ")
            }
        )
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "rflow", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let level = match &cli.log_level {
        Some(level) => {
            config::validate_log_level(level).context("--log-level")?;
            level.clone()
        }
        None => cfg.log.level.clone(),
    };
    logging::init(&level);

    let registry = SourceRegistry::from_config(&cfg)?;

    match cli.command {
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Inspect {
            source,
            limit,
            format,
        } => {
            inspect::run_inspect(lookup(&registry, &source)?, limit, format).await?;
        }
        Commands::Run {
            pipeline: name,
            dry_run,
            progress,
        } => {
            let reporter = progress
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();
            let summary = pipeline::run_pipeline_with_registry(
                &cfg,
                &registry,
                &name,
                RunOptions { dry_run },
                reporter.as_ref(),
            )
            .await?;
            eprint!("{}", summary.to_report());
        }
        Commands::Query {
            source,
            filters,
            metrics,
            format,
            output,
        } => {
            let spec = AggregateSpec::parse(&metrics, &filters)?;
            let target = if spec.metrics.is_empty() {
                OutputTarget::Records
            } else {
                OutputTarget::Summary
            };
            if target == OutputTarget::Summary
                && matches!(format, QueryFormat::Table | QueryFormat::Csv)
            {
                anyhow::bail!("metric summaries render as text or json only");
            }
            let mut out = OutputConfig::stdout(target, format.into());
            out.path = output;
            let plan = Plan {
                name: "query".to_string(),
                source: source.clone(),
                predicate: spec.filter,
                metrics: spec.metrics,
                outputs: vec![out],
            };
            pipeline::execute(
                &plan,
                lookup(&registry, &source)?,
                RunOptions::default(),
                &NoProgress,
            )
            .await?;
        }
        Commands::Convert { source, to, output } => {
            convert::run_convert(lookup(&registry, &source)?, to, output.as_deref()).await?;
        }
        // Handled before the config is loaded.
        Commands::Completions { .. } => {}
    }

    Ok(())
}
