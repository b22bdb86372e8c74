//! Record predicates and filtering.
//!
//! A predicate is a pure `Record → bool` test. [`Predicate`] is the data
//! form used by configuration and the CLI (it can be parsed from a short
//! expression such as `grade >= 80`); any `Fn(&Record) -> bool` closure
//! works too, through [`RecordPredicate`].
//!
//! Comparisons are numeric when both sides are numeric and textual
//! otherwise. A test on a field the record lacks is false.
//!
//! # Expression syntax
//!
//! | Form | Meaning |
//! |------|---------|
//! | `level == ERROR` | equality (case-sensitive) |
//! | `status != "not found"` | inequality, quoted value kept as text |
//! | `grade >= 80`, `>`, `<`, `<=` | thresholds |
//! | `message ~ failed` | substring match |
//! | `port in 1..1024` | inclusive range |
//! | `has user` | field is present |

use std::cmp::Ordering;
use std::fmt;

use crate::error::{PipelineError, Result};
use crate::models::{Record, RecordSequence, Value};

/// Anything that can decide whether a record is kept.
pub trait RecordPredicate {
    fn matches(&self, record: &Record) -> bool;
}

impl<F> RecordPredicate for F
where
    F: Fn(&Record) -> bool,
{
    fn matches(&self, record: &Record) -> bool {
        self(record)
    }
}

/// Comparison operator for [`Predicate::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }

    fn accepts(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
        }
    }
}

/// Declarative record predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every record.
    Always,
    Exists(String),
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// Inclusive range.
    Between {
        field: String,
        low: Value,
        high: Value,
    },
    Contains {
        field: String,
        needle: String,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    pub fn between(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Predicate::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Parse one expression (see the module docs for the syntax).
    pub fn parse(expression: &str) -> Result<Predicate> {
        let invalid = |reason: &str| PipelineError::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };
        let expr = expression.trim();
        if expr.is_empty() {
            return Err(invalid("empty expression"));
        }

        if let Some(field) = expr.strip_prefix("has ") {
            return Ok(Predicate::Exists(parse_field(field).ok_or_else(|| invalid("missing field name"))?));
        }

        if let Some((field, right)) = split_range(expr) {
            let (low, high) = right
                .trim()
                .split_once("..")
                .ok_or_else(|| invalid("range must look like low..high"))?;
            let low = parse_value(low).ok_or_else(|| invalid("missing range start"))?;
            let high = parse_value(high).ok_or_else(|| invalid("missing range end"))?;
            if low.compare(&high) == Ordering::Greater {
                return Err(invalid("range start is greater than range end"));
            }
            return Ok(Predicate::Between { field, low, high });
        }

        let (pos, op) = find_operator(expr).ok_or_else(|| invalid("no comparison operator"))?;
        let field = parse_field(&expr[..pos]).ok_or_else(|| invalid("missing field name"))?;
        let operand = &expr[pos + op.len()..];
        if op == "~" {
            let needle = unquote(operand).ok_or_else(|| invalid("missing value"))?;
            return Ok(Predicate::Contains {
                field,
                needle: needle.to_string(),
            });
        }
        let value = parse_value(operand).ok_or_else(|| invalid("missing value"))?;

        Ok(match op {
            "==" => Predicate::compare(field, CompareOp::Eq, value),
            "!=" => Predicate::compare(field, CompareOp::Ne, value),
            ">=" => Predicate::compare(field, CompareOp::Ge, value),
            "<=" => Predicate::compare(field, CompareOp::Le, value),
            ">" => Predicate::compare(field, CompareOp::Gt, value),
            _ => Predicate::compare(field, CompareOp::Lt, value),
        })
    }

    /// Parse several expressions and AND them. No expressions → [`Predicate::Always`].
    pub fn parse_all<S: AsRef<str>>(expressions: &[S]) -> Result<Predicate> {
        let mut parts = expressions
            .iter()
            .map(|e| Predicate::parse(e.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(match parts.len() {
            0 => Predicate::Always,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        })
    }
}

const OPERATORS: [&str; 7] = ["==", "!=", ">=", "<=", ">", "<", "~"];

/// Leftmost operator, preferring two-character operators at the same spot.
fn find_operator(expr: &str) -> Option<(usize, &'static str)> {
    expr.char_indices().find_map(|(i, _)| {
        OPERATORS
            .iter()
            .find(|op| expr[i..].starts_with(**op))
            .map(|op| (i, *op))
    })
}

fn parse_field(text: &str) -> Option<String> {
    let field = text.trim();
    if field.is_empty() || field.contains(char::is_whitespace) {
        None
    } else {
        Some(field.to_string())
    }
}

/// `field in low..high`, recognized only when the left side is a single
/// bare field token.
fn split_range(expr: &str) -> Option<(String, &str)> {
    let (left, right) = expr.split_once(" in ")?;
    let field = parse_field(left)?;
    if find_operator(&field).is_some() || field.contains('"') {
        return None;
    }
    Some((field, right))
}

/// Trimmed text with one pair of surrounding quotes removed.
fn unquote(text: &str) -> Option<&str> {
    let text = text.trim();
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        return Some(&text[1..text.len() - 1]);
    }
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Quoted text stays text; anything else is type-inferred.
fn parse_value(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let inner = unquote(trimmed)?;
    if inner.len() < trimmed.len() {
        Some(Value::from(inner))
    } else {
        Some(Value::infer(inner))
    }
}

impl RecordPredicate for Predicate {
    fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Exists(field) => record.contains(field),
            Predicate::Compare { field, op, value } => record
                .get(field)
                .is_some_and(|v| op.accepts(v.compare(value))),
            Predicate::Between { field, low, high } => record.get(field).is_some_and(|v| {
                v.compare(low) != Ordering::Less && v.compare(high) != Ordering::Greater
            }),
            Predicate::Contains { field, needle } => record
                .get(field)
                .is_some_and(|v| v.render().contains(needle.as_str())),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(record)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(record)),
            Predicate::Not(inner) => !inner.matches(record),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Always => f.write_str("true"),
            Predicate::Exists(field) => write!(f, "has {}", field),
            Predicate::Compare { field, op, value } => {
                write!(f, "{} {} {}", field, op.symbol(), value)
            }
            Predicate::Between { field, low, high } => {
                write!(f, "{} in {}..{}", field, low, high)
            }
            Predicate::Contains { field, needle } => write!(f, "{} ~ {}", field, needle),
            Predicate::And(parts) => join(f, parts, " && "),
            Predicate::Or(parts) => join(f, parts, " || "),
            Predicate::Not(inner) => write!(f, "!({})", inner),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", p)?;
    }
    f.write_str(")")
}

/// Keep the records `predicate` accepts, in their original order.
///
/// The input is left untouched; the result shares field storage with it.
pub fn filter<P>(records: &RecordSequence, predicate: &P) -> RecordSequence
where
    P: RecordPredicate + ?Sized,
{
    records
        .iter()
        .filter(|r| predicate.matches(r))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grades() -> RecordSequence {
        [("Alice", 85i64), ("Bob", 92), ("Charlie", 70)]
            .into_iter()
            .map(|(name, grade)| {
                Record::from_pairs([("name", Value::from(name)), ("grade", Value::from(grade))])
            })
            .collect()
    }

    fn names(seq: &RecordSequence) -> Vec<String> {
        seq.iter()
            .map(|r| r.get("name").map(Value::render).unwrap_or_default())
            .collect()
    }

    #[test]
    fn threshold_keeps_order() {
        let kept = filter(&grades(), &Predicate::ge("grade", 80i64));
        assert_eq!(names(&kept), vec!["Alice", "Bob"]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let p = Predicate::parse("grade >= 80").unwrap();
        let once = filter(&grades(), &p);
        let twice = filter(&once, &p);
        assert_eq!(once, twice);
    }

    #[test]
    fn input_is_not_mutated() {
        let input = grades();
        let before = input.clone();
        let _ = filter(&input, &Predicate::eq("name", "Bob"));
        assert_eq!(input, before);
    }

    #[test]
    fn closures_are_predicates() {
        let kept = filter(&grades(), &|r: &Record| {
            r.get("name").and_then(Value::as_str).is_some_and(|n| n.starts_with('C'))
        });
        assert_eq!(names(&kept), vec!["Charlie"]);
    }

    #[test]
    fn missing_field_never_matches() {
        let kept = filter(&grades(), &Predicate::eq("level", "ERROR"));
        assert!(kept.is_empty());
        let negated = filter(&grades(), &Predicate::eq("level", "ERROR").negate());
        assert_eq!(negated.len(), 3);
    }

    #[test]
    fn equality_is_case_sensitive() {
        let r = Record::from_pairs([("level", "ERROR")]);
        assert!(Predicate::eq("level", "ERROR").matches(&r));
        assert!(!Predicate::eq("level", "error").matches(&r));
    }

    #[test]
    fn parse_operators() {
        assert_eq!(
            Predicate::parse("grade>=80").unwrap(),
            Predicate::compare("grade", CompareOp::Ge, 80i64)
        );
        assert_eq!(
            Predicate::parse(" level == ERROR ").unwrap(),
            Predicate::eq("level", "ERROR")
        );
        assert_eq!(
            Predicate::parse("status != \"not found\"").unwrap(),
            Predicate::compare("status", CompareOp::Ne, "not found")
        );
        assert_eq!(
            Predicate::parse("grade < 7").unwrap(),
            Predicate::compare("grade", CompareOp::Lt, 7i64)
        );
        assert_eq!(
            Predicate::parse("message ~ failed").unwrap(),
            Predicate::Contains {
                field: "message".into(),
                needle: "failed".into()
            }
        );
        assert_eq!(
            Predicate::parse("port in 1..1024").unwrap(),
            Predicate::between("port", 1i64, 1024i64)
        );
        assert_eq!(Predicate::parse("has user").unwrap(), Predicate::Exists("user".into()));
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "grade", "== 3", "grade >=", "port in 10", "port in 9..1", "a b == c"] {
            let err = Predicate::parse(bad).unwrap_err();
            assert!(
                matches!(err, PipelineError::InvalidExpression { .. }),
                "expected InvalidExpression for {:?}",
                bad
            );
        }
    }

    #[test]
    fn parse_all_ands_expressions() {
        let p = Predicate::parse_all(&["grade >= 80", "name != Bob"]).unwrap();
        assert_eq!(names(&filter(&grades(), &p)), vec!["Alice"]);
        assert_eq!(Predicate::parse_all::<&str>(&[]).unwrap(), Predicate::Always);
    }

    #[test]
    fn substring_needle_is_taken_verbatim() {
        let p = Predicate::parse("message ~ 1.0").unwrap();
        assert_eq!(
            p,
            Predicate::Contains {
                field: "message".into(),
                needle: "1.0".into()
            }
        );
        assert!(!p.matches(&Record::from_pairs([("message", "build 10 failed")])));
        assert!(p.matches(&Record::from_pairs([("message", "release 1.0 shipped")])));

        let code = Predicate::parse("code ~ 007").unwrap();
        assert!(!code.matches(&Record::from_pairs([("code", "agent 7")])));
        assert!(code.matches(&Record::from_pairs([("code", "agent 007")])));

        let quoted = Predicate::parse("message ~ \" failed \"").unwrap();
        assert!(quoted.matches(&Record::from_pairs([("message", "login failed twice")])));
        assert!(!quoted.matches(&Record::from_pairs([("message", "failed")])));
    }

    #[test]
    fn quoted_value_may_contain_in() {
        assert_eq!(
            Predicate::parse("status == \"sign in now\"").unwrap(),
            Predicate::eq("status", "sign in now")
        );
        assert_eq!(
            Predicate::parse("message ~ logged in as").unwrap(),
            Predicate::Contains {
                field: "message".into(),
                needle: "logged in as".into()
            }
        );
        assert_eq!(
            Predicate::parse("port in 22..443").unwrap(),
            Predicate::between("port", 22i64, 443i64)
        );
    }

    #[test]
    fn range_is_inclusive() {
        let p = Predicate::between("grade", 70i64, 85i64);
        assert_eq!(names(&filter(&grades(), &p)), vec!["Alice", "Charlie"]);
    }

    #[test]
    fn display_round_trips_simple_forms() {
        let p = Predicate::parse("grade >= 80").unwrap();
        assert_eq!(p.to_string(), "grade >= 80");
        assert_eq!(Predicate::parse(&p.to_string()).unwrap(), p);
    }
}
