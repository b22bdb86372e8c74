//! # recordflow
//!
//! Load records from line logs, CSV, JSON, or SQLite queries, filter and
//! aggregate them, and write reports as text, tables, JSON, CSV, or rows
//! of a SQLite table.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │   Sources    │──▶│     Engine       │──▶│    Sinks     │
//! │ log/csv/json │   │ filter+aggregate │   │ stdout/file/ │
//! │    table     │   │ (recordflow-core)│   │ sqlite table │
//! └──────────────┘   └──────────────────┘   └──────────────┘
//! ```
//!
//! The pure parts (record model, parsers, predicates, metrics, renderers)
//! live in `recordflow-core` and are re-exported here. This crate adds the
//! I/O around them: configuration, file and SQLite sources, sinks, and the
//! pipeline runner behind the `rflow` binary.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`traits`] | `RecordSource` trait and `SourceRegistry` |
//! | [`source_fs`] | Line-log, CSV, and JSON files (single or batched) |
//! | [`source_table`] | Parameterized SQLite queries |
//! | [`sink`] | Stdout/file writer and SQLite table sink |
//! | [`pipeline`] | Runs a configured pipeline end to end |
//! | [`inspect`] | Print a source's records |
//! | [`convert`] | Re-serialize a source as JSON or CSV |
//! | [`sources`] | Source status listing |
//! | [`progress`] | Run progress on stderr |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | SQLite connection helpers |

pub mod config;
pub mod convert;
pub mod db;
pub mod inspect;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod sink;
pub mod source_fs;
pub mod source_table;
pub mod sources;
pub mod traits;

pub use recordflow_core::{aggregate, error, filter, models, parse, render};
