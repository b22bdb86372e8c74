//! Pipeline error taxonomy.
//!
//! Structural failures (a missing file, invalid JSON syntax, an average of
//! nothing) abort the operation and propagate as [`PipelineError`]. Record
//! level problems never abort: malformed lines become
//! [`SkippedEntry`](crate::models::SkippedEntry) values during a load, and
//! missing or non-numeric fields become warnings on an
//! [`AggregateResult`](crate::aggregate::AggregateResult).

/// Errors produced by sources, the aggregation engine, and sinks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// The location (file, directory, or database) does not exist.
    #[error("source not found: {location}")]
    SourceNotFound { location: String },

    /// Permission, I/O, or database failure while reading.
    #[error("cannot read {location}: {reason}")]
    SourceAccess { location: String, reason: String },

    /// The root structure of the input cannot be parsed into records.
    #[error("malformed source {location}{}: {reason}", line_suffix(.line))]
    SourceFormat {
        location: String,
        line: Option<usize>,
        reason: String,
    },

    /// A metric referenced a field the record does not have.
    #[error("{metric}: record {index} has no field '{field}'")]
    MissingField {
        metric: String,
        field: String,
        index: usize,
    },

    /// A sum or average met a value that is not a number.
    #[error("{metric}: record {index} field '{field}' is not numeric ({value})")]
    NonNumeric {
        metric: String,
        field: String,
        index: usize,
        value: String,
    },

    /// The metric is undefined over zero contributing records.
    #[error("{metric}: no records to aggregate")]
    EmptyInput { metric: String },

    /// CSV rendering met a record whose field set differs from the header.
    #[error("row {row} has fields [{}], expected [{}]", .found.join(", "), .expected.join(", "))]
    SchemaMismatch {
        row: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// A value cannot be represented in the requested output format.
    #[error("render failed: {reason}")]
    Render { reason: String },

    /// Writing the rendered report failed.
    #[error("cannot write {destination}: {reason}")]
    SinkAccess { destination: String, reason: String },

    /// A filter expression or metric definition could not be parsed.
    #[error("invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },
}

fn line_suffix(line: &Option<usize>) -> String {
    match line {
        Some(n) => format!(" (line {})", n),
        None => String::new(),
    }
}

impl PipelineError {
    /// Shorthand for a [`PipelineError::SourceFormat`] error.
    pub fn format(location: impl Into<String>, line: Option<usize>, reason: impl Into<String>) -> Self {
        PipelineError::SourceFormat {
            location: location.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Map an I/O error on `location` to `SourceNotFound` or `SourceAccess`.
    pub fn from_io(location: impl Into<String>, err: &std::io::Error) -> Self {
        let location = location.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            PipelineError::SourceNotFound { location }
        } else {
            PipelineError::SourceAccess {
                location,
                reason: err.to_string(),
            }
        }
    }

    /// Whether this error is a record-level warning rather than a failure.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingField { .. } | PipelineError::NonNumeric { .. }
        )
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
