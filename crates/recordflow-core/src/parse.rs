//! Text parsers for the file-based source formats.
//!
//! Each parser turns the full text of one input into a [`LoadOutcome`].
//! Parsers never touch the filesystem; reading the bytes is the job of the
//! source adapters in the `recordflow` crate.
//!
//! # Failure policy
//!
//! | Problem | Outcome |
//! |---------|---------|
//! | Log line with too few tokens | skipped and counted |
//! | CSV row with the wrong field count | skipped and counted |
//! | JSON array element that is not an object | skipped and counted |
//! | Invalid JSON syntax, scalar root, missing header | [`PipelineError::SourceFormat`] |
//!
//! # Example
//!
//! ```rust
//! use recordflow_core::parse::{parse_line_log, LineLogFormat};
//!
//! let text = "2025-10-04T14:30:15 INFO user alice logged in\nbroken\n";
//! let outcome = parse_line_log(text, &LineLogFormat::default(), "auth.log");
//! assert_eq!(outcome.records.len(), 1);
//! assert_eq!(outcome.skipped_count(), 1);
//! ```

use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::models::{LoadOutcome, Record, RecordSequence, SkippedEntry, Value};

/// Layout of a line-delimited log.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LineLogFormat {
    /// Names for the leading tokens. Their count is the minimum token count.
    pub fields: Vec<String>,
    /// Field receiving the text after the leading tokens. `None` drops it.
    pub rest_field: Option<String>,
    /// Single-character delimiter. `None` splits on runs of whitespace.
    pub delimiter: Option<char>,
}

impl Default for LineLogFormat {
    fn default() -> Self {
        Self {
            fields: vec!["timestamp".to_string(), "level".to_string()],
            rest_field: Some("message".to_string()),
            delimiter: None,
        }
    }
}

impl LineLogFormat {
    pub fn min_tokens(&self) -> usize {
        self.fields.len()
    }
}

/// Parse a line-delimited log. Blank lines are ignored; lines with fewer
/// than [`LineLogFormat::min_tokens`] tokens are skipped and counted.
pub fn parse_line_log(text: &str, format: &LineLogFormat, location: &str) -> LoadOutcome {
    let mut records = Vec::new();
    let mut skipped = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        match split_tokens(line, format.min_tokens(), format.delimiter) {
            Ok((tokens, rest)) => {
                let mut pairs: Vec<(String, Value)> = format
                    .fields
                    .iter()
                    .cloned()
                    .zip(tokens.into_iter().map(Value::from))
                    .collect();
                if let Some(rest_field) = &format.rest_field {
                    pairs.push((rest_field.clone(), Value::from(rest)));
                }
                records.push(Record::from_pairs(pairs));
            }
            Err(found) => skipped.push(SkippedEntry {
                location: location.to_string(),
                line: idx + 1,
                reason: format!(
                    "expected at least {} tokens, found {}",
                    format.min_tokens(),
                    found
                ),
            }),
        }
    }

    LoadOutcome {
        records: RecordSequence::new(records),
        skipped,
    }
}

/// Split off `n` leading tokens and return them with the trimmed remainder.
/// On failure returns how many tokens were found.
fn split_tokens(line: &str, n: usize, delimiter: Option<char>) -> std::result::Result<(Vec<&str>, &str), usize> {
    let mut tokens = Vec::with_capacity(n);
    match delimiter {
        None => {
            let mut rest = line.trim_start();
            while tokens.len() < n {
                if rest.is_empty() {
                    return Err(tokens.len());
                }
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                tokens.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            Ok((tokens, rest.trim_end()))
        }
        Some(d) => {
            let mut parts = line.splitn(n + 1, d);
            while tokens.len() < n {
                match parts.next() {
                    Some(token) => tokens.push(token.trim()),
                    None => return Err(tokens.len()),
                }
            }
            Ok((tokens, parts.next().map(str::trim).unwrap_or("")))
        }
    }
}

/// Layout of a CSV file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CsvFormat {
    pub delimiter: char,
    /// Type cells with [`Value::infer`]; when false every cell is a string.
    pub infer_types: bool,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            delimiter: ',',
            infer_types: true,
        }
    }
}

/// Parse CSV text. The first non-blank line is the header; rows whose field
/// count differs from the header's are skipped and counted. Cells and
/// header names are trimmed. Quoting is not supported.
pub fn parse_csv(text: &str, format: &CsvFormat, location: &str) -> Result<LoadOutcome> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, raw)| (idx + 1, raw.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty());

    let (header_line, header_text) = lines
        .next()
        .ok_or_else(|| PipelineError::format(location, None, "missing header row"))?;

    let header: Vec<String> = header_text
        .split(format.delimiter)
        .map(|h| h.trim().to_string())
        .collect();
    if let Some(pos) = header.iter().position(String::is_empty) {
        return Err(PipelineError::format(
            location,
            Some(header_line),
            format!("header column {} is empty", pos + 1),
        ));
    }
    for (i, name) in header.iter().enumerate() {
        if header[..i].contains(name) {
            return Err(PipelineError::format(
                location,
                Some(header_line),
                format!("duplicate header '{}'", name),
            ));
        }
    }

    let mut records = Vec::new();
    let mut skipped = Vec::new();
    for (line_no, line) in lines {
        let cells: Vec<&str> = line.split(format.delimiter).map(str::trim).collect();
        if cells.len() != header.len() {
            skipped.push(SkippedEntry {
                location: location.to_string(),
                line: line_no,
                reason: format!("expected {} fields, found {}", header.len(), cells.len()),
            });
            continue;
        }
        let values = cells.into_iter().map(|cell| {
            if format.infer_types {
                Value::infer(cell)
            } else {
                Value::from(cell)
            }
        });
        records.push(Record::from_pairs(header.iter().cloned().zip(values)));
    }

    Ok(LoadOutcome {
        records: RecordSequence::new(records),
        skipped,
    })
}

/// Layout of a JSON document.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct JsonFormat {
    /// Field of the root object that holds the record array
    /// (e.g. `"indicators"` in a threat-intel feed).
    pub records_field: Option<String>,
}

/// Parse a JSON document whose root is an array of objects, a single object,
/// or an object holding the array under [`JsonFormat::records_field`].
pub fn parse_json(text: &str, format: &JsonFormat, location: &str) -> Result<LoadOutcome> {
    let root: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| PipelineError::format(location, Some(e.line()), e.to_string()))?;

    let items = match (root, &format.records_field) {
        (serde_json::Value::Object(mut obj), Some(field)) => match obj.remove(field) {
            Some(serde_json::Value::Array(items)) => items,
            Some(_) => {
                return Err(PipelineError::format(
                    location,
                    None,
                    format!("field '{}' is not an array", field),
                ))
            }
            None => {
                return Err(PipelineError::format(
                    location,
                    None,
                    format!("root object has no field '{}'", field),
                ))
            }
        },
        (serde_json::Value::Object(obj), None) => vec![serde_json::Value::Object(obj)],
        (serde_json::Value::Array(items), _) => items,
        (other, _) => {
            return Err(PipelineError::format(
                location,
                None,
                format!("root must be an object or array, found {}", json_kind(&other)),
            ))
        }
    };

    let mut records = Vec::with_capacity(items.len());
    let mut skipped = Vec::new();
    for (idx, item) in items.into_iter().enumerate() {
        match Value::from(item) {
            Value::Record(r) => records.push(r),
            other => skipped.push(SkippedEntry {
                location: location.to_string(),
                line: idx + 1,
                reason: format!("element {} is not an object ({})", idx + 1, other.render()),
            }),
        }
    }

    Ok(LoadOutcome {
        records: RecordSequence::new(records),
        skipped,
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
