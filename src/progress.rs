//! Pipeline run progress reporting.
//!
//! Reports what `rflow run` is doing (loading, filtering, writing) so long
//! batch loads are not silent. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;

/// A single progress event for a pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub enum RunProgressEvent {
    /// Source is being read. Total unknown.
    Loading { pipeline: String, source: String },
    /// Source read; records filtered.
    Filtered {
        pipeline: String,
        matched: u64,
        total: u64,
    },
    /// Output n of total is being written.
    Writing {
        pipeline: String,
        destination: String,
        n: u64,
        total: u64,
    },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait RunProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline runner.
    fn report(&self, event: RunProgressEvent);
}

/// Human-friendly progress on stderr: "run passing  filtered  1,234 / 5,000 records".
pub struct StderrProgress;

impl RunProgressReporter for StderrProgress {
    fn report(&self, event: RunProgressEvent) {
        let line = match &event {
            RunProgressEvent::Loading { pipeline, source } => {
                format!("run {}  loading {}...\n", pipeline, source)
            }
            RunProgressEvent::Filtered {
                pipeline,
                matched,
                total,
            } => format!(
                "run {}  filtered  {} / {} records\n",
                pipeline,
                format_number(*matched),
                format_number(*total)
            ),
            RunProgressEvent::Writing {
                pipeline,
                destination,
                n,
                total,
            } => format!(
                "run {}  writing  {} ({}/{})\n",
                pipeline, destination, n, total
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl RunProgressReporter for JsonProgress {
    fn report(&self, event: RunProgressEvent) {
        let obj = match &event {
            RunProgressEvent::Loading { pipeline, source } => serde_json::json!({
                "event": "progress",
                "pipeline": pipeline,
                "phase": "loading",
                "source": source
            }),
            RunProgressEvent::Filtered {
                pipeline,
                matched,
                total,
            } => serde_json::json!({
                "event": "progress",
                "pipeline": pipeline,
                "phase": "filtered",
                "matched": matched,
                "total": total
            }),
            RunProgressEvent::Writing {
                pipeline,
                destination,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "pipeline": pipeline,
                "phase": "writing",
                "destination": destination,
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl RunProgressReporter for NoProgress {
    fn report(&self, _event: RunProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn RunProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
