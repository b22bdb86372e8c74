//! Pipeline runner: load → filter → aggregate → render → write.
//!
//! A run is a straight sequence of awaited steps. The source is read in
//! full, filtered once, aggregated once (when the pipeline has metrics),
//! and each configured output is rendered and written in order. The first
//! fatal error stops the run; outputs already written stay written.
//!
//! Every run carries a fresh UUID so its log lines can be told apart.

use anyhow::{Context, Result};
use recordflow_core::aggregate::{aggregate, AggregateResult, AggregateSpec, Metric};
use recordflow_core::error::PipelineError;
use recordflow_core::filter::{filter, Predicate};
use recordflow_core::models::RecordSequence;
use recordflow_core::render::{render_csv, render_json, render_table, render_text};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{Config, OutputConfig, OutputFormat, OutputTarget, PipelineConfig};
use crate::progress::{RunProgressEvent, RunProgressReporter};
use crate::sink::{self, Destination, TableSink};
use crate::traits::{RecordSource, SourceRegistry};

/// A pipeline with its expressions parsed.
#[derive(Debug, Clone)]
pub struct Plan {
    pub name: String,
    pub source: String,
    pub predicate: Option<Predicate>,
    pub metrics: Vec<Metric>,
    pub outputs: Vec<OutputConfig>,
}

impl Plan {
    pub fn from_config(name: &str, config: &PipelineConfig) -> Result<Self> {
        let spec = AggregateSpec::parse(&config.metrics, &config.filters)
            .with_context(|| format!("pipeline '{}'", name))?;
        Ok(Self {
            name: name.to_string(),
            source: config.source.clone(),
            predicate: spec.filter,
            metrics: spec.metrics,
            outputs: config.outputs.clone(),
        })
    }

    /// The configured outputs, or text to stdout when none are configured:
    /// the summary if there are metrics, the matching records otherwise.
    pub fn effective_outputs(&self) -> Vec<OutputConfig> {
        if !self.outputs.is_empty() {
            return self.outputs.clone();
        }
        let target = if self.metrics.is_empty() {
            OutputTarget::Records
        } else {
            OutputTarget::Summary
        };
        vec![OutputConfig::stdout(target, OutputFormat::Text)]
    }

    /// Metrics only; the predicate has already been applied to the input.
    fn metrics_spec(&self) -> AggregateSpec {
        AggregateSpec {
            metrics: self.metrics.clone(),
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Load, filter, and aggregate, but write nothing.
    pub dry_run: bool,
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub pipeline: String,
    pub run_id: Uuid,
    pub loaded: usize,
    pub skipped: usize,
    pub matched: usize,
    pub aggregate: Option<AggregateResult>,
    /// Destinations written, in output order.
    pub written: Vec<String>,
    pub dry_run: bool,
}

impl RunSummary {
    /// Multi-line report in the `run <name>` / `ok` shape.
    pub fn to_report(&self) -> String {
        let mut out = String::new();
        if self.dry_run {
            out.push_str(&format!("run {} (dry-run)\n", self.pipeline));
        } else {
            out.push_str(&format!("run {}\n", self.pipeline));
        }
        out.push_str(&format!("  loaded: {} records\n", self.loaded));
        out.push_str(&format!("  skipped: {}\n", self.skipped));
        out.push_str(&format!("  matched: {}\n", self.matched));
        if let Some(result) = &self.aggregate {
            out.push_str(&format!("  metrics: {}\n", result.metrics.len()));
            if !result.warnings.is_empty() {
                out.push_str(&format!("  warnings: {}\n", result.warnings.len()));
            }
        }
        for destination in &self.written {
            out.push_str(&format!("  wrote: {}\n", destination));
        }
        out.push_str("ok\n");
        out
    }
}

/// Run a configured pipeline against the sources in `config`.
pub async fn run_pipeline(
    config: &Config,
    name: &str,
    options: RunOptions,
    progress: &dyn RunProgressReporter,
) -> Result<RunSummary> {
    let registry = SourceRegistry::from_config(config)?;
    run_pipeline_with_registry(config, &registry, name, options, progress).await
}

/// Like [`run_pipeline`], resolving the source through a caller-supplied
/// registry (which may hold custom sources).
pub async fn run_pipeline_with_registry(
    config: &Config,
    registry: &SourceRegistry,
    name: &str,
    options: RunOptions,
    progress: &dyn RunProgressReporter,
) -> Result<RunSummary> {
    let pipeline = config.pipelines.get(name).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown pipeline: '{}'. Configured pipelines: {}",
            name,
            list_or_none(config.pipelines.keys().map(String::as_str))
        )
    })?;
    let plan = Plan::from_config(name, pipeline)?;
    let source = registry.get(&plan.source).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown source: '{}'. Registered sources: {}",
            plan.source,
            list_or_none(registry.names().into_iter())
        )
    })?;
    execute(&plan, source, options, progress).await
}

/// Run a plan against an already-resolved source.
pub async fn execute(
    plan: &Plan,
    source: &dyn RecordSource,
    options: RunOptions,
    progress: &dyn RunProgressReporter,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let span = info_span!("run", pipeline = %plan.name, run_id = %run_id);
    execute_inner(plan, source, options, progress, run_id)
        .instrument(span)
        .await
}

async fn execute_inner(
    plan: &Plan,
    source: &dyn RecordSource,
    options: RunOptions,
    progress: &dyn RunProgressReporter,
    run_id: Uuid,
) -> Result<RunSummary> {
    progress.report(RunProgressEvent::Loading {
        pipeline: plan.name.clone(),
        source: source.name().to_string(),
    });
    let outcome = source
        .load()
        .await
        .with_context(|| format!("loading source '{}'", source.name()))?;
    debug!(
        source = source.name(),
        kind = source.kind(),
        records = outcome.records.len(),
        skipped = outcome.skipped_count(),
        "source loaded"
    );
    for entry in &outcome.skipped {
        warn!(location = %entry.location, line = entry.line, reason = %entry.reason, "skipped entry");
    }

    let matched = match &plan.predicate {
        Some(predicate) => filter(&outcome.records, predicate),
        None => outcome.records.clone(),
    };
    debug!(matched = matched.len(), total = outcome.records.len(), "filter applied");
    progress.report(RunProgressEvent::Filtered {
        pipeline: plan.name.clone(),
        matched: matched.len() as u64,
        total: outcome.records.len() as u64,
    });

    let summary = if plan.metrics.is_empty() {
        None
    } else {
        let result = aggregate(&matched, &plan.metrics_spec())
            .with_context(|| format!("aggregating pipeline '{}'", plan.name))?;
        for warning in &result.warnings {
            warn!(%warning, "aggregation warning");
        }
        Some(result)
    };

    let outputs = plan.effective_outputs();
    let mut written = Vec::new();
    if options.dry_run {
        info!(outputs = outputs.len(), "dry run, nothing written");
    } else {
        for (i, output) in outputs.iter().enumerate() {
            progress.report(RunProgressEvent::Writing {
                pipeline: plan.name.clone(),
                destination: describe_output(output),
                n: i as u64 + 1,
                total: outputs.len() as u64,
            });
            let destination = write_output(output, &matched, summary.as_ref())
                .await
                .with_context(|| format!("writing output {} of '{}'", i + 1, plan.name))?;
            written.push(destination);
        }
    }

    info!(
        loaded = outcome.records.len(),
        skipped = outcome.skipped_count(),
        matched = matched.len(),
        "run complete"
    );

    Ok(RunSummary {
        pipeline: plan.name.clone(),
        run_id,
        loaded: outcome.records.len(),
        skipped: outcome.skipped_count(),
        matched: matched.len(),
        aggregate: summary,
        written,
        dry_run: options.dry_run,
    })
}

/// Render one output's content: records or the summary, in its format.
pub fn render_output(
    target: OutputTarget,
    format: OutputFormat,
    records: &RecordSequence,
    summary: Option<&AggregateResult>,
) -> std::result::Result<String, PipelineError> {
    match target {
        OutputTarget::Records => match format {
            OutputFormat::Text => Ok(render_text(records)),
            OutputFormat::Table => Ok(render_table(records)),
            OutputFormat::Json => render_json(records),
            OutputFormat::Csv => render_csv(records),
            OutputFormat::Sqlite => Err(PipelineError::Render {
                reason: "sqlite is a table sink, not a rendered format".to_string(),
            }),
        },
        OutputTarget::Summary => {
            let summary = summary.ok_or_else(|| PipelineError::Render {
                reason: "no metrics were computed".to_string(),
            })?;
            match format {
                OutputFormat::Text => Ok(render_text(summary)),
                OutputFormat::Json => render_json(summary),
                other => Err(PipelineError::Render {
                    reason: format!("a summary cannot be rendered as {}", other.as_str()),
                }),
            }
        }
    }
}

async fn write_output(
    output: &OutputConfig,
    records: &RecordSequence,
    summary: Option<&AggregateResult>,
) -> Result<String> {
    if output.format == OutputFormat::Sqlite {
        let (database, table) = match (&output.database, &output.table) {
            (Some(d), Some(t)) => (d, t),
            _ => anyhow::bail!("sqlite outputs need a database and a table"),
        };
        let sink = TableSink::new(database, table).replace(output.replace);
        let rows = sink.write_records(records).await?;
        return Ok(format!("{} ({} rows)", describe_output(output), rows));
    }

    let rendered = render_output(output.target, output.format, records, summary)?;
    let destination = Destination::from_path(output.path.clone());
    sink::write(&destination, &rendered)?;
    Ok(destination.to_string())
}

fn describe_output(output: &OutputConfig) -> String {
    match (&output.database, &output.table, &output.path) {
        (Some(db), Some(table), _) => format!("{}#{}", db.display(), table),
        (_, _, Some(path)) => path.display().to_string(),
        _ => "stdout".to_string(),
    }
}

fn list_or_none<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let names: Vec<&str> = names.collect();
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::progress::NoProgress;
    use recordflow_core::aggregate::MetricValue;
    use recordflow_core::models::{Record, Value};
    use tempfile::TempDir;

    fn grades() -> RecordSequence {
        [("Alice", 85i64), ("Bob", 92), ("Carol", 71)]
            .into_iter()
            .map(|(n, g)| Record::from_pairs([("name", Value::from(n)), ("grade", Value::from(g))]))
            .collect()
    }

    fn config_for(dir: &TempDir, outputs: &str) -> Config {
        std::fs::write(
            dir.path().join("grades.csv"),
            "name,grade\nAlice,85\nBob,92\nCarol,71\n",
        )
        .unwrap();
        let text = format!(
            r#"
[sources.grades]
kind = "csv"
path = "{}"

[pipelines.passing]
source = "grades"
where = ["grade >= 80"]
metrics = ["count", "average:grade"]
{}
"#,
            dir.path().join("grades.csv").display(),
            outputs
        );
        parse_config(&text).unwrap()
    }

    #[test]
    fn default_outputs() {
        let mut plan = Plan {
            name: "p".into(),
            source: "s".into(),
            predicate: None,
            metrics: vec![],
            outputs: vec![],
        };
        assert_eq!(plan.effective_outputs()[0].target, OutputTarget::Records);
        plan.metrics.push(Metric::Count);
        assert_eq!(plan.effective_outputs()[0].target, OutputTarget::Summary);
    }

    #[tokio::test]
    async fn summary_covers_matched_records() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir, "");
        let plan = Plan::from_config("passing", &config.pipelines["passing"]).unwrap();
        assert!(plan.metrics_spec().filter.is_none());

        let summary = run_pipeline(&config, "passing", RunOptions { dry_run: true }, &NoProgress)
            .await
            .unwrap();
        let result = summary.aggregate.unwrap();
        assert_eq!(result.input_count, summary.matched);
        assert_eq!(result.get("count"), Some(&MetricValue::Count(2)));
    }

    #[test]
    fn render_records_and_summary() {
        let records = grades();
        assert_eq!(
            render_output(OutputTarget::Records, OutputFormat::Text, &records, None).unwrap(),
            "Alice 85\nBob 92\nCarol 71\n"
        );
        assert!(matches!(
            render_output(OutputTarget::Summary, OutputFormat::Text, &records, None),
            Err(PipelineError::Render { .. })
        ));

        let spec = AggregateSpec::new().metric(Metric::Count);
        let result = aggregate(&records, &spec).unwrap();
        assert_eq!(
            render_output(OutputTarget::Summary, OutputFormat::Text, &records, Some(&result))
                .unwrap(),
            "count: 3\n"
        );
        assert!(render_output(OutputTarget::Summary, OutputFormat::Csv, &records, Some(&result))
            .is_err());
    }

    #[tokio::test]
    async fn runs_configured_pipeline_to_files() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out/passing.txt");
        let summary_out = dir.path().join("out/summary.json");
        let config = config_for(
            &dir,
            &format!(
                "[[pipelines.passing.outputs]]\nformat = \"text\"\npath = \"{}\"\n\
                 [[pipelines.passing.outputs]]\ntarget = \"summary\"\nformat = \"json\"\npath = \"{}\"\n",
                out.display(),
                summary_out.display()
            ),
        );

        let summary = run_pipeline(&config, "passing", RunOptions::default(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(summary.loaded, 3);
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.written.len(), 2);
        assert_eq!(
            summary.aggregate.as_ref().unwrap().get("count"),
            Some(&MetricValue::Count(2))
        );

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "Alice 85\nBob 92\n");
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary_out).unwrap()).unwrap();
        assert_eq!(json["input_count"], 2);
        assert_eq!(json["metrics"]["average:grade"], 88.5);

        let report = summary.to_report();
        assert!(report.starts_with("run passing\n"));
        assert!(report.contains("  matched: 2\n"));
        assert!(report.ends_with("ok\n"));
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("passing.txt");
        let config = config_for(
            &dir,
            &format!(
                "[[pipelines.passing.outputs]]\nformat = \"text\"\npath = \"{}\"\n",
                out.display()
            ),
        );
        let summary = run_pipeline(
            &config,
            "passing",
            RunOptions { dry_run: true },
            &NoProgress,
        )
        .await
        .unwrap();
        assert!(summary.written.is_empty());
        assert!(!out.exists());
        assert!(summary.to_report().starts_with("run passing (dry-run)\n"));
    }

    #[tokio::test]
    async fn unknown_pipeline_lists_known() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir, "");
        let err = run_pipeline(&config, "nope", RunOptions::default(), &NoProgress)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Configured pipelines: passing"));
    }

    #[tokio::test]
    async fn missing_source_file_fails_the_run() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir, "");
        std::fs::remove_file(dir.path().join("grades.csv")).unwrap();
        let err = run_pipeline(&config, "passing", RunOptions { dry_run: true }, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::SourceNotFound { .. })
        ));
    }
}
