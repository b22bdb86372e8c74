//! Aggregate statistics over a record sequence.
//!
//! An [`AggregateSpec`] lists the metrics to compute and, optionally, a
//! predicate. The predicate is always applied first, so every metric in the
//! [`AggregateResult`] describes the filtered subset; there is no way to
//! aggregate and then filter.
//!
//! # Metrics
//!
//! | Syntax | Result |
//! |--------|--------|
//! | `count` | number of records |
//! | `count_by:<field>` | category → count breakdown |
//! | `sum:<field>` | floating-point sum (0 when nothing contributes) |
//! | `average:<field>` / `avg:<field>` | mean; fails on zero contributors |
//! | `min:<field>` / `max:<field>` | extreme value; fails on zero contributors |
//! | `distinct:<field>` | number of distinct values |
//! | `top<N>:<field>` | N most frequent categories |
//!
//! Records missing a referenced field (or holding a non-numeric value for
//! `sum`/`average`) are left out of that metric only, and a warning is
//! recorded on the result.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{PipelineError, Result};
use crate::filter::{filter, Predicate};
use crate::models::{RecordSequence, Value};

/// One requested statistic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metric {
    Count,
    CountBy(String),
    Sum(String),
    Average(String),
    Min(String),
    Max(String),
    Distinct(String),
    Top { field: String, n: usize },
}

impl Metric {
    /// Deterministic key under which the metric appears in a result.
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// The field the metric reads, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Metric::Count => None,
            Metric::CountBy(f)
            | Metric::Sum(f)
            | Metric::Average(f)
            | Metric::Min(f)
            | Metric::Max(f)
            | Metric::Distinct(f)
            | Metric::Top { field: f, .. } => Some(f),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Count => f.write_str("count"),
            Metric::CountBy(field) => write!(f, "count_by:{}", field),
            Metric::Sum(field) => write!(f, "sum:{}", field),
            Metric::Average(field) => write!(f, "average:{}", field),
            Metric::Min(field) => write!(f, "min:{}", field),
            Metric::Max(field) => write!(f, "max:{}", field),
            Metric::Distinct(field) => write!(f, "distinct:{}", field),
            Metric::Top { field, n } => write!(f, "top{}:{}", n, field),
        }
    }
}

impl FromStr for Metric {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| PipelineError::InvalidExpression {
            expression: s.to_string(),
            reason: reason.to_string(),
        };
        let text = s.trim();
        if text == "count" {
            return Ok(Metric::Count);
        }
        let (kind, field) = text
            .split_once(':')
            .ok_or_else(|| invalid("expected <metric>:<field>"))?;
        let field = field.trim();
        if field.is_empty() {
            return Err(invalid("missing field name"));
        }
        let field = field.to_string();
        match kind.trim() {
            "count_by" => Ok(Metric::CountBy(field)),
            "sum" => Ok(Metric::Sum(field)),
            "average" | "avg" => Ok(Metric::Average(field)),
            "min" => Ok(Metric::Min(field)),
            "max" => Ok(Metric::Max(field)),
            "distinct" => Ok(Metric::Distinct(field)),
            other => match other.strip_prefix("top").map(str::parse::<usize>) {
                Some(Ok(n)) if n > 0 => Ok(Metric::Top { field, n }),
                Some(_) => Err(invalid("top needs a positive count, e.g. top5:field")),
                None => Err(invalid("unknown metric")),
            },
        }
    }
}

/// Metrics to compute, plus the predicate applied before computing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSpec {
    pub metrics: Vec<Metric>,
    pub filter: Option<Predicate>,
}

impl AggregateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metric(mut self, metric: Metric) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(predicate);
        self
    }

    /// Build a spec from metric strings and filter expressions.
    pub fn parse<M: AsRef<str>, W: AsRef<str>>(metrics: &[M], filters: &[W]) -> Result<Self> {
        let metrics = metrics
            .iter()
            .map(|m| m.as_ref().parse::<Metric>())
            .collect::<Result<Vec<_>>>()?;
        let filter = if filters.is_empty() {
            None
        } else {
            Some(Predicate::parse_all(filters)?)
        };
        Ok(Self { metrics, filter })
    }
}

/// A category and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankEntry {
    pub value: String,
    pub count: u64,
}

/// The computed value of one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Count(u64),
    Number(f64),
    Value(Value),
    Breakdown(BTreeMap<String, u64>),
    Ranking(Vec<RankEntry>),
}

/// Metric name → value, computed over the (filtered) input.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregateResult {
    /// Records the metrics were computed over, after filtering.
    pub input_count: usize,
    pub metrics: BTreeMap<String, MetricValue>,
    /// Record-level problems that excluded a record from a metric.
    #[serde(serialize_with = "serialize_warnings")]
    pub warnings: Vec<PipelineError>,
}

impl AggregateResult {
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    /// Value of the plain `count` metric, if it was requested.
    pub fn count(&self) -> Option<u64> {
        match self.metrics.get("count") {
            Some(MetricValue::Count(n)) => Some(*n),
            _ => None,
        }
    }
}

fn serialize_warnings<S: Serializer>(
    warnings: &[PipelineError],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(warnings.iter().map(|w| w.to_string()))
}

/// Compute `spec` over `records`, filtering first when the spec has a predicate.
///
/// # Errors
///
/// [`PipelineError::EmptyInput`] when an average, min, or max has no
/// contributing records. Missing or non-numeric fields are not errors; they
/// are reported in [`AggregateResult::warnings`].
pub fn aggregate(records: &RecordSequence, spec: &AggregateSpec) -> Result<AggregateResult> {
    let filtered;
    let input = match &spec.filter {
        Some(predicate) => {
            filtered = filter(records, predicate);
            &filtered
        }
        None => records,
    };

    let mut result = AggregateResult {
        input_count: input.len(),
        ..AggregateResult::default()
    };
    for metric in &spec.metrics {
        let value = compute(metric, input, &mut result.warnings)?;
        result.metrics.insert(metric.name(), value);
    }
    Ok(result)
}

fn compute(
    metric: &Metric,
    input: &RecordSequence,
    warnings: &mut Vec<PipelineError>,
) -> Result<MetricValue> {
    let field = match metric.field() {
        Some(f) => f,
        None => return Ok(MetricValue::Count(input.len() as u64)),
    };

    // Values of `field`, recording a warning for each record without it.
    let mut present: Vec<(usize, &Value)> = Vec::with_capacity(input.len());
    for (index, record) in input.iter().enumerate() {
        match record.get(field) {
            Some(v) => present.push((index, v)),
            None => warnings.push(PipelineError::MissingField {
                metric: metric.name(),
                field: field.to_string(),
                index,
            }),
        }
    }

    match metric {
        Metric::Count => Ok(MetricValue::Count(input.len() as u64)),
        Metric::CountBy(_) => Ok(MetricValue::Breakdown(tally(&present))),
        Metric::Top { n, .. } => {
            let mut ranking: Vec<RankEntry> = tally(&present)
                .into_iter()
                .map(|(value, count)| RankEntry { value, count })
                .collect();
            // BTreeMap order already sorts ties by name; the sort is stable.
            ranking.sort_by(|a, b| b.count.cmp(&a.count));
            ranking.truncate(*n);
            Ok(MetricValue::Ranking(ranking))
        }
        Metric::Distinct(_) => {
            let distinct: HashSet<String> = present.iter().map(|(_, v)| v.render()).collect();
            Ok(MetricValue::Count(distinct.len() as u64))
        }
        Metric::Sum(_) | Metric::Average(_) => {
            let mut sum = 0.0_f64;
            let mut contributing = 0usize;
            for (index, value) in present {
                match value.as_f64() {
                    Some(x) => {
                        sum += x;
                        contributing += 1;
                    }
                    None => warnings.push(PipelineError::NonNumeric {
                        metric: metric.name(),
                        field: field.to_string(),
                        index,
                        value: value.render(),
                    }),
                }
            }
            if matches!(metric, Metric::Sum(_)) {
                Ok(MetricValue::Number(sum))
            } else if contributing == 0 {
                Err(PipelineError::EmptyInput {
                    metric: metric.name(),
                })
            } else {
                Ok(MetricValue::Number(sum / contributing as f64))
            }
        }
        Metric::Min(_) | Metric::Max(_) => {
            let want_max = matches!(metric, Metric::Max(_));
            present
                .into_iter()
                .map(|(_, v)| v)
                .reduce(|best, v| {
                    let ord = v.compare(best);
                    let better = if want_max { ord.is_gt() } else { ord.is_lt() };
                    if better {
                        v
                    } else {
                        best
                    }
                })
                .map(|v| MetricValue::Value(v.clone()))
                .ok_or_else(|| PipelineError::EmptyInput {
                    metric: metric.name(),
                })
        }
    }
}

fn tally(present: &[(usize, &Value)]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for (_, value) in present {
        *counts.entry(value.render()).or_insert(0) += 1;
    }
    counts
}
