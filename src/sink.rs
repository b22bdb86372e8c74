//! Report sinks: rendered text to stdout or a file, records into a SQLite
//! table.

use recordflow_core::error::{PipelineError, Result};
use recordflow_core::models::{RecordSequence, Value};
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::debug;

use crate::db;

/// Where rendered output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    File(PathBuf),
}

impl Destination {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(p) => Destination::File(p),
            None => Destination::Stdout,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Stdout => f.write_str("stdout"),
            Destination::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Write rendered output. Files get their parent directories created and
/// are replaced wholesale; the handle is closed before returning, on
/// success or failure. Stdout output always ends with a newline.
pub fn write(destination: &Destination, rendered: &str) -> Result<()> {
    let sink_err = |e: std::io::Error| PipelineError::SinkAccess {
        destination: destination.to_string(),
        reason: e.to_string(),
    };

    match destination {
        Destination::Stdout => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            out.write_all(rendered.as_bytes()).map_err(sink_err)?;
            if !rendered.is_empty() && !rendered.ends_with('\n') {
                out.write_all(b"\n").map_err(sink_err)?;
            }
            out.flush().map_err(sink_err)?;
        }
        Destination::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(sink_err)?;
            }
            let file = std::fs::File::create(path).map_err(sink_err)?;
            let mut out = BufWriter::new(file);
            out.write_all(rendered.as_bytes()).map_err(sink_err)?;
            out.flush().map_err(sink_err)?;
        }
    }

    debug!(destination = %destination, bytes = rendered.len(), "output written");
    Ok(())
}

/// SQL identifiers cannot be bound as parameters, so table and column
/// names are restricted to `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Writes records into a SQLite table inside one transaction.
#[derive(Debug, Clone)]
pub struct TableSink {
    pub database: PathBuf,
    pub table: String,
    /// Delete existing rows before inserting.
    pub replace: bool,
}

impl TableSink {
    pub fn new(database: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            replace: false,
        }
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    fn destination(&self) -> String {
        format!("{}#{}", self.database.display(), self.table)
    }

    /// Insert every record, creating the table from the schema if it does
    /// not exist. Returns the number of rows written.
    pub async fn write_records(&self, records: &RecordSequence) -> Result<usize> {
        if !is_valid_identifier(&self.table) {
            return Err(PipelineError::Render {
                reason: format!("'{}' is not a valid table name", self.table),
            });
        }
        let schema = records.schema();
        for column in &schema {
            if !is_valid_identifier(column) {
                return Err(PipelineError::Render {
                    reason: format!("field '{}' is not a valid column name", column),
                });
            }
        }
        for (idx, record) in records.iter().enumerate() {
            if !record.has_field_set(&schema) {
                return Err(PipelineError::SchemaMismatch {
                    row: idx + 1,
                    expected: schema.clone(),
                    found: record.field_names().map(str::to_string).collect(),
                });
            }
        }
        if schema.is_empty() && !records.is_empty() {
            return Err(PipelineError::Render {
                reason: "records have no fields to form table columns".to_string(),
            });
        }

        let pool = db::connect(&self.database)
            .await
            .map_err(|e| self.access_err(format!("{:#}", e)))?;
        let result = self.insert_all(&pool, records, &schema).await;
        pool.close().await;

        if let Ok(n) = &result {
            debug!(destination = %self.destination(), rows = n, "table written");
        }
        result
    }

    async fn insert_all(
        &self,
        pool: &sqlx::SqlitePool,
        records: &RecordSequence,
        schema: &[String],
    ) -> Result<usize> {
        let sql_err = |e: sqlx::Error| self.access_err(e.to_string());
        let mut tx = pool.begin().await.map_err(sql_err)?;

        if let Some(first) = records.get(0) {
            let columns = schema
                .iter()
                .map(|name| {
                    let affinity = column_affinity(first.get(name).unwrap_or(&Value::Null));
                    format!("\"{}\" {}", name, affinity)
                })
                .collect::<Vec<_>>()
                .join(", ");
            let create = format!("CREATE TABLE IF NOT EXISTS \"{}\" ({})", self.table, columns);
            sqlx::query(&create).execute(&mut *tx).await.map_err(sql_err)?;
        }

        if self.replace {
            let delete = format!("DELETE FROM \"{}\"", self.table);
            match sqlx::query(&delete).execute(&mut *tx).await {
                Ok(_) => {}
                // Nothing to clear when there are no records and no table yet.
                Err(_) if records.is_empty() => {}
                Err(e) => return Err(sql_err(e)),
            }
        }

        if !records.is_empty() {
            let insert = format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                self.table,
                schema
                    .iter()
                    .map(|c| format!("\"{}\"", c))
                    .collect::<Vec<_>>()
                    .join(", "),
                vec!["?"; schema.len()].join(", ")
            );
            for record in records {
                let mut query = sqlx::query(&insert);
                for column in schema {
                    query = db::bind_value(query, record.get(column).unwrap_or(&Value::Null));
                }
                query.execute(&mut *tx).await.map_err(sql_err)?;
            }
        }

        tx.commit().await.map_err(sql_err)?;
        Ok(records.len())
    }

    fn access_err(&self, reason: String) -> PipelineError {
        PipelineError::SinkAccess {
            destination: self.destination(),
            reason,
        }
    }
}

fn column_affinity(value: &Value) -> &'static str {
    match value {
        Value::Int(_) | Value::Bool(_) => "INTEGER",
        Value::Float(_) => "REAL",
        _ => "TEXT",
    }
}
