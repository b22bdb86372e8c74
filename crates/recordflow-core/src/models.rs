//! Core data models used throughout recordflow.
//!
//! A [`Record`] is an ordered field → [`Value`] mapping. Records are built
//! once and never mutated: every "modifying" helper returns a new record,
//! and clones share the underlying field storage, so a filtered view and
//! the sequence it came from can coexist without aliasing surprises.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{PipelineError, Result};

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit JSON `null`. Sources never produce it for absent fields.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Record(Record),
}

impl Value {
    /// Type a raw text cell: integer, then float, then lowercase boolean,
    /// otherwise string.
    pub fn infer(raw: &str) -> Value {
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
        match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Str(raw.to_string()),
        }
    }

    /// Numeric view: integers, floats, and strings that parse as a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value is a nested record or list.
    pub fn is_nested(&self) -> bool {
        matches!(self, Value::List(_) | Value::Record(_))
    }

    /// Plain-text form: strings unquoted, nested values as compact JSON.
    pub fn render(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(_) | Value::Record(_) => {
                serde_json::to_string(self).unwrap_or_else(|_| "<unrenderable>".to_string())
            }
        }
    }

    /// Total order used by predicates and min/max: numeric when both sides
    /// are numeric, otherwise by rendered text.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => self.render().cmp(&other.render()),
        }
    }

    /// Equality under the same rules as [`Value::compare`]. Case-sensitive.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Record(Record::from_json_map(map)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Record(r) => r.serialize(serializer),
        }
    }
}

/// An ordered, immutable field → value mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Arc<[(String, Value)]>,
}

impl Record {
    /// Build a record from `(name, value)` pairs, keeping first-seen order.
    /// A repeated name keeps its first position and takes the later value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut fields: Vec<(String, Value)> = Vec::new();
        for (k, v) in pairs {
            let name = k.into();
            let value = v.into();
            match fields.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = value,
                None => fields.push((name, value)),
            }
        }
        Self {
            fields: fields.into(),
        }
    }

    fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::from_pairs(map.into_iter().map(|(k, v)| (k, Value::from(v))))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == field).map(|(_, v)| v)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in insertion order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// A new record with `field` set (appended if new, replaced in place
    /// otherwise). `self` is unchanged.
    pub fn with_field(&self, field: impl Into<String>, value: impl Into<Value>) -> Record {
        let pairs = self
            .fields
            .iter()
            .cloned()
            .chain(std::iter::once((field.into(), value.into())));
        Record::from_pairs(pairs)
    }

    /// A new record without `field`.
    pub fn without_field(&self, field: &str) -> Record {
        Record::from_pairs(self.fields.iter().filter(|(n, _)| n != field).cloned())
    }

    /// A new record with only the named fields, in the order given.
    /// Names the record does not have are ignored.
    pub fn project(&self, fields: &[&str]) -> Record {
        Record::from_pairs(
            fields
                .iter()
                .filter_map(|name| self.get(name).map(|v| (name.to_string(), v.clone()))),
        )
    }

    /// Whether this record has exactly the given field set (any order).
    pub fn has_field_set(&self, names: &[String]) -> bool {
        self.len() == names.len() && names.iter().all(|n| self.contains(n))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in self.fields.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// The ordered records produced by one ingestion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSequence {
    records: Vec<Record>,
}

impl RecordSequence {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[Record] {
        &self.records
    }

    pub fn into_vec(self) -> Vec<Record> {
        self.records
    }

    /// Field names of the first record, in order. Empty for an empty sequence.
    pub fn schema(&self) -> Vec<String> {
        self.records
            .first()
            .map(|r| r.field_names().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// The first `n` records.
    pub fn head(&self, n: usize) -> RecordSequence {
        RecordSequence::new(self.records.iter().take(n).cloned().collect())
    }
}

impl FromIterator<Record> for RecordSequence {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RecordSequence {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for RecordSequence {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl Serialize for RecordSequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.records.len()))?;
        for record in &self.records {
            seq.serialize_element(record)?;
        }
        seq.end()
    }
}

/// A line or element a source could not turn into a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEntry {
    /// File (or other location) the entry came from.
    pub location: String,
    /// 1-based line number, or 1-based element position for JSON arrays.
    pub line: usize,
    pub reason: String,
}

/// Records plus the entries skipped while loading them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadOutcome {
    pub records: RecordSequence,
    pub skipped: Vec<SkippedEntry>,
}

impl LoadOutcome {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Append another outcome (used when a source spans several files).
    pub fn extend(&mut self, other: LoadOutcome) {
        let mut records = std::mem::take(&mut self.records).into_vec();
        records.extend(other.records);
        self.records = RecordSequence::new(records);
        self.skipped.extend(other.skipped);
    }

    /// Turn the first skipped entry, if any, into a fatal
    /// [`PipelineError::SourceFormat`].
    pub fn reject_skipped(self) -> Result<Self> {
        match self.skipped.first() {
            Some(entry) => Err(PipelineError::format(
                entry.location.clone(),
                Some(entry.line),
                entry.reason.clone(),
            )),
            None => Ok(self),
        }
    }
}
