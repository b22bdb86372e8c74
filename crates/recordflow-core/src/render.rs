//! Report renderers: text, aligned table, JSON, and CSV.
//!
//! Rendering is pure: every function returns a `String` and leaves writing
//! it somewhere to the sinks. Field order is deterministic: records follow
//! the first record's field order, aggregate results follow sorted metric
//! names.

use crate::aggregate::{AggregateResult, MetricValue};
use crate::error::{PipelineError, Result};
use crate::models::{Record, RecordSequence, Value};

/// Something a sink can render: a record sequence or an aggregate result.
pub trait Report {
    /// Line-oriented, human-readable form.
    fn to_text(&self) -> String;

    /// Lossless pretty-printed JSON.
    fn to_json(&self) -> Result<String>;
}

impl Report for RecordSequence {
    /// One line per record, values joined by single spaces, no header.
    fn to_text(&self) -> String {
        let schema = self.schema();
        let mut out = String::new();
        for record in self {
            out.push_str(render_line(record, &schema).trim_end());
            out.push('\n');
        }
        out
    }

    fn to_json(&self) -> Result<String> {
        to_pretty_json(self)
    }
}

impl Report for AggregateResult {
    /// One `name: value` line per metric in sorted name order. Breakdowns
    /// and rankings list their entries beneath, with their share of
    /// [`AggregateResult::input_count`].
    fn to_text(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.metrics {
            match value {
                MetricValue::Count(n) => out.push_str(&format!("{}: {}\n", name, n)),
                MetricValue::Number(x) => out.push_str(&format!("{}: {}\n", name, format_number(*x))),
                MetricValue::Value(v) => out.push_str(&format!("{}: {}\n", name, v)),
                MetricValue::Breakdown(counts) => {
                    out.push_str(&format!("{}:\n", name));
                    for (category, count) in counts {
                        out.push_str(&self.share_line(category, *count));
                    }
                }
                MetricValue::Ranking(entries) => {
                    out.push_str(&format!("{}:\n", name));
                    for entry in entries {
                        out.push_str(&self.share_line(&entry.value, entry.count));
                    }
                }
            }
        }
        if !self.warnings.is_empty() {
            out.push_str(&format!("warnings: {}\n", self.warnings.len()));
        }
        out
    }

    fn to_json(&self) -> Result<String> {
        to_pretty_json(self)
    }
}

impl AggregateResult {
    fn share_line(&self, category: &str, count: u64) -> String {
        let pct = if self.input_count > 0 {
            count as f64 * 100.0 / self.input_count as f64
        } else {
            0.0
        };
        format!("  {}: {} ({:.1}%)\n", category, count, pct)
    }
}

fn to_pretty_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| PipelineError::Render {
        reason: e.to_string(),
    })
}

/// Whole numbers without decimals, everything else with two.
fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{:.0}", x)
    } else {
        format!("{:.2}", x)
    }
}

/// Values of `schema` fields in order, then any fields outside the schema.
fn ordered_values<'a>(record: &'a Record, schema: &'a [String]) -> Vec<&'a Value> {
    let mut values: Vec<&Value> = schema.iter().filter_map(|f| record.get(f)).collect();
    values.extend(
        record
            .iter()
            .filter(|(name, _)| !schema.iter().any(|s| s.as_str() == *name))
            .map(|(_, v)| v),
    );
    values
}

fn render_line(record: &Record, schema: &[String]) -> String {
    ordered_values(record, schema)
        .into_iter()
        .map(Value::render)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render records or an aggregate result as text.
pub fn render_text<R: Report + ?Sized>(report: &R) -> String {
    report.to_text()
}

/// Render records or an aggregate result as pretty JSON. Records render as
/// an array of objects that the JSON source reads back unchanged.
pub fn render_json<R: Report + ?Sized>(report: &R) -> Result<String> {
    report.to_json()
}

/// Render records as CSV.
///
/// The header is the first record's field order. Every record must have the
/// same field set (in any order) or rendering fails with
/// [`PipelineError::SchemaMismatch`]. Values that would need quoting
/// (delimiters, quotes, line breaks) or are nested fail with
/// [`PipelineError::Render`], as do header names with those characters.
/// `Null` renders as an empty cell. An empty sequence renders as nothing;
/// records without any fields cannot be rendered.
pub fn render_csv(records: &RecordSequence) -> Result<String> {
    if records.is_empty() {
        return Ok(String::new());
    }
    let header = records.schema();
    for (idx, record) in records.iter().enumerate() {
        if !record.has_field_set(&header) {
            return Err(PipelineError::SchemaMismatch {
                row: idx + 1,
                expected: header.clone(),
                found: record.field_names().map(str::to_string).collect(),
            });
        }
    }
    if header.is_empty() {
        return Err(PipelineError::Render {
            reason: "records have no fields to form a CSV header".to_string(),
        });
    }
    if let Some(name) = header.iter().find(|name| needs_quoting(name)) {
        return Err(PipelineError::Render {
            reason: format!(
                "field name '{}' contains a delimiter, quote, or line break",
                name.escape_debug()
            ),
        });
    }

    let mut out = header.join(",");
    out.push('\n');
    for (idx, record) in records.iter().enumerate() {
        let cells = header
            .iter()
            .map(|field| csv_cell(record.get(field).unwrap_or(&Value::Null), idx + 1, field))
            .collect::<Result<Vec<_>>>()?;
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    Ok(out)
}

fn csv_cell(value: &Value, row: usize, field: &str) -> Result<String> {
    if value.is_nested() {
        return Err(PipelineError::Render {
            reason: format!("row {} field '{}' is nested and has no CSV form", row, field),
        });
    }
    let text = match value {
        Value::Null => String::new(),
        other => other.render(),
    };
    if needs_quoting(&text) {
        return Err(PipelineError::Render {
            reason: format!(
                "row {} field '{}' contains a delimiter, quote, or line break",
                row, field
            ),
        });
    }
    Ok(text)
}

fn needs_quoting(text: &str) -> bool {
    text.contains([',', '"', '\n', '\r'])
}

/// Every field name in first-seen order across all records.
fn column_union(records: &RecordSequence) -> Vec<String> {
    let mut columns = records.schema();
    for record in records.iter().skip(1) {
        for name in record.field_names() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }
    }
    columns
}

/// Render records as a fixed-width table with an upper-cased header and a
/// dashed rule. Numeric columns are right-aligned.
///
/// Columns are every field any record has, in first-seen order; a record
/// lacking a column shows a blank cell.
pub fn render_table(records: &RecordSequence) -> String {
    let schema = column_union(records);
    if schema.is_empty() {
        return String::new();
    }

    let cells: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            schema
                .iter()
                .map(|f| r.get(f).map(Value::render).unwrap_or_default())
                .collect()
        })
        .collect();
    let numeric: Vec<bool> = schema
        .iter()
        .map(|f| {
            records
                .iter()
                .filter_map(|r| r.get(f))
                .all(|v| matches!(v, Value::Int(_) | Value::Float(_)))
        })
        .collect();
    let widths: Vec<usize> = schema
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |row: &[String]| -> String {
        row.iter()
            .enumerate()
            .map(|(i, cell)| {
                if numeric[i] {
                    format!("{:>width$}", cell, width = widths[i])
                } else {
                    format!("{:<width$}", cell, width = widths[i])
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let header: Vec<String> = schema.iter().map(|s| s.to_uppercase()).collect();
    let total = widths.iter().sum::<usize>() + 2 * (widths.len() - 1);
    let mut out = format_row(&header[..]);
    out.push('\n');
    out.push_str(&"-".repeat(total));
    out.push('\n');
    for row in &cells {
        out.push_str(&format_row(&row[..]));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, AggregateSpec, Metric};
    use crate::filter::{filter, Predicate};
    use crate::parse::{parse_csv, parse_json, parse_line_log, CsvFormat, JsonFormat, LineLogFormat};

    const GRADES: &str = "name,grade\nAlice,85\nBob,92\nCharlie,70\n";

    fn grades() -> RecordSequence {
        parse_csv(GRADES, &CsvFormat::default(), "grades.csv").unwrap().records
    }

    #[test]
    fn grades_scenario_end_to_end() {
        let records = grades();
        let passing = filter(&records, &Predicate::parse("grade >= 80").unwrap());
        let result = aggregate(&passing, &AggregateSpec::new().metric(Metric::Count)).unwrap();
        assert_eq!(result.count(), Some(2));
        assert_eq!(render_text(&passing), "Alice 85\nBob 92\n");
    }

    #[test]
    fn line_log_text_round_trip_keeps_timestamp_level_pairs() {
        let text = "t1 INFO started\nt2 WARNING disk 91%\nbad\nt3 ERROR  crash   here\nt4 INFO\n";
        let first = parse_line_log(text, &LineLogFormat::default(), "app.log");
        assert_eq!(first.skipped_count(), 1);

        let rendered = render_text(&first.records);
        let second = parse_line_log(&rendered, &LineLogFormat::default(), "rendered");
        assert_eq!(second.skipped_count(), 0);

        let pairs = |seq: &RecordSequence| -> Vec<(String, String)> {
            let mut v: Vec<_> = seq
                .iter()
                .map(|r| (r.get("timestamp").unwrap().render(), r.get("level").unwrap().render()))
                .collect();
            v.sort();
            v
        };
        assert_eq!(pairs(&first.records), pairs(&second.records));
    }

    #[test]
    fn json_round_trip_preserves_fields_and_order() {
        let nested = r#"[
            {"id": "INC-1", "severity": "HIGH", "score": 9.5, "open": true,
             "assets": ["WS-1", "WS-2"], "owner": {"name": "Smith", "team": "SOC"}, "note": null},
            {"id": "INC-2", "severity": "LOW", "score": 2, "open": false,
             "assets": [], "owner": {"name": "Jones", "team": "IT"}, "note": "ok"}
        ]"#;
        let original = parse_json(nested, &JsonFormat::default(), "in.json").unwrap().records;
        let rendered = render_json(&original).unwrap();
        let reloaded = parse_json(&rendered, &JsonFormat::default(), "out.json").unwrap().records;
        assert_eq!(original, reloaded);
        assert_eq!(reloaded.schema(), vec!["id", "severity", "score", "open", "assets", "owner", "note"]);
    }

    #[test]
    fn csv_round_trip() {
        let records = grades();
        let rendered = render_csv(&records).unwrap();
        assert_eq!(rendered, GRADES);
    }

    #[test]
    fn csv_reorders_fields_to_header() {
        let records: RecordSequence = vec![
            Record::from_pairs([("a", 1i64), ("b", 2)]),
            Record::from_pairs([("b", 4i64), ("a", 3)]),
        ]
        .into_iter()
        .collect();
        assert_eq!(render_csv(&records).unwrap(), "a,b\n1,2\n3,4\n");
    }

    #[test]
    fn csv_rejects_heterogeneous_records() {
        let records: RecordSequence = vec![
            Record::from_pairs([("a", 1i64), ("b", 2)]),
            Record::from_pairs([("a", 3i64)]),
        ]
        .into_iter()
        .collect();
        let err = render_csv(&records).unwrap_err();
        assert_eq!(
            err,
            PipelineError::SchemaMismatch {
                row: 2,
                expected: vec!["a".into(), "b".into()],
                found: vec!["a".into()],
            }
        );
    }

    #[test]
    fn csv_rejects_values_needing_quotes() {
        let records: RecordSequence =
            vec![Record::from_pairs([("name", "Smith, John")])].into_iter().collect();
        assert!(matches!(render_csv(&records), Err(PipelineError::Render { .. })));

        let nested: RecordSequence = vec![Record::from_pairs([(
            "owner",
            Value::Record(Record::from_pairs([("n", 1i64)])),
        )])]
        .into_iter()
        .collect();
        assert!(matches!(render_csv(&nested), Err(PipelineError::Render { .. })));
    }

    #[test]
    fn csv_leading_empty_record_is_a_mismatch() {
        let records = parse_json(r#"[{}, {"a": 1}]"#, &JsonFormat::default(), "x.json")
            .unwrap()
            .records;
        assert_eq!(records.len(), 2);
        assert_eq!(
            render_csv(&records).unwrap_err(),
            PipelineError::SchemaMismatch {
                row: 2,
                expected: vec![],
                found: vec!["a".into()],
            }
        );

        let only_empty = RecordSequence::new(vec![Record::default()]);
        assert!(matches!(render_csv(&only_empty), Err(PipelineError::Render { .. })));
    }

    #[test]
    fn csv_rejects_header_needing_quotes() {
        let records = RecordSequence::new(vec![Record::from_pairs([("last, first", "Smith")])]);
        assert!(matches!(render_csv(&records), Err(PipelineError::Render { .. })));
    }

    #[test]
    fn table_shows_fields_of_later_records() {
        let records = parse_json(r#"[{}, {"a": 1}]"#, &JsonFormat::default(), "x.json")
            .unwrap()
            .records;
        assert_eq!(render_table(&records), "A\n-\n\n1\n");
    }

    #[test]
    fn empty_sequence_renders_empty() {
        let empty = RecordSequence::default();
        assert_eq!(render_text(&empty), "");
        assert_eq!(render_csv(&empty).unwrap(), "");
        assert_eq!(render_table(&empty), "");
        assert_eq!(render_json(&empty).unwrap(), "[]");
    }

    #[test]
    fn aggregate_text_is_sorted_with_shares() {
        let text = "t1 INFO a\nt2 ERROR b\nt3 INFO c\nt4 WARNING d\n";
        let records = parse_line_log(text, &LineLogFormat::default(), "x.log").records;
        let spec = AggregateSpec::parse(&["count_by:level", "count", "max:timestamp"], &[] as &[&str]).unwrap();
        let result = aggregate(&records, &spec).unwrap();
        assert_eq!(
            render_text(&result),
            "count: 4\n\
             count_by:level:\n  ERROR: 1 (25.0%)\n  INFO: 2 (50.0%)\n  WARNING: 1 (25.0%)\n\
             max:timestamp: t4\n"
        );
    }

    #[test]
    fn aggregate_text_formats_numbers_and_warnings() {
        let records = grades();
        let spec = AggregateSpec::parse(&["sum:grade", "average:grade", "sum:bytes"], &[] as &[&str]).unwrap();
        let result = aggregate(&records, &spec).unwrap();
        assert_eq!(
            render_text(&result),
            "average:grade: 82.33\nsum:bytes: 0\nsum:grade: 247\nwarnings: 3\n"
        );
    }

    #[test]
    fn table_aligns_columns() {
        let table = render_table(&grades());
        assert_eq!(
            table,
            "NAME     GRADE\n\
             --------------\n\
             Alice       85\n\
             Bob         92\n\
             Charlie     70\n"
        );
    }
}
