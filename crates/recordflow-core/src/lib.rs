//! # recordflow core
//!
//! I/O-free logic for recordflow: the record model, text parsers for each
//! source format, predicates, aggregation, and report renderers.
//!
//! This crate contains no tokio, sqlx, or filesystem access. Reading
//! files and databases and writing reports live in the `recordflow` crate.
//!
//! ```text
//! text ──parse──▶ RecordSequence ──filter──▶ RecordSequence ──render──▶ String
//!                                    └──aggregate──▶ AggregateResult ──┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use recordflow_core::aggregate::{aggregate, AggregateSpec};
//! use recordflow_core::parse::{parse_csv, CsvFormat};
//! use recordflow_core::render::render_text;
//!
//! let outcome = parse_csv("name,grade\nAlice,85\nBob,92\nCharlie,70\n", &CsvFormat::default(), "grades.csv")?;
//! let spec = AggregateSpec::parse(&["count", "average:grade"], &["grade >= 80"])?;
//! let result = aggregate(&outcome.records, &spec)?;
//! assert_eq!(result.count(), Some(2));
//! assert_eq!(render_text(&result), "average:grade: 88.50\ncount: 2\n");
//! # Ok::<(), recordflow_core::error::PipelineError>(())
//! ```

pub mod aggregate;
pub mod error;
pub mod filter;
pub mod models;
pub mod parse;
pub mod render;
