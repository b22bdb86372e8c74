//! SQLite-backed source: the rows of one parameterized query.

use async_trait::async_trait;
use recordflow_core::error::{PipelineError, Result};
use recordflow_core::models::{LoadOutcome, Record, RecordSequence, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::path::PathBuf;
use tracing::debug;

use crate::config::{SqlParam, TableSourceConfig};
use crate::db;
use crate::traits::RecordSource;

#[derive(Debug, Clone)]
pub struct TableSource {
    name: String,
    database: PathBuf,
    query: String,
    params: Vec<Value>,
}

impl TableSource {
    pub fn new(name: impl Into<String>, database: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: database.into(),
            query: query.into(),
            params: Vec::new(),
        }
    }

    pub fn from_config(name: &str, config: &TableSourceConfig) -> Self {
        Self::new(name, &config.database, &config.query)
            .with_params(config.params.iter().map(param_value).collect())
    }

    /// Positional parameters for the `?` placeholders of the query.
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    fn access_err(&self, reason: String) -> PipelineError {
        PipelineError::SourceAccess {
            location: self.location(),
            reason,
        }
    }

    async fn fetch(&self, pool: &sqlx::SqlitePool) -> Result<RecordSequence> {
        let mut query = sqlx::query(&self.query);
        for param in &self.params {
            query = db::bind_value(query, param);
        }
        let rows = query
            .fetch_all(pool)
            .await
            .map_err(|e| self.access_err(e.to_string()))?;

        rows.iter()
            .map(|row| row_to_record(row).map_err(|e| self.access_err(e.to_string())))
            .collect()
    }
}

fn param_value(param: &SqlParam) -> Value {
    match param {
        SqlParam::Bool(b) => Value::Bool(*b),
        SqlParam::Int(i) => Value::Int(*i),
        SqlParam::Float(f) => Value::Float(*f),
        SqlParam::Text(s) => Value::Str(s.clone()),
    }
}

/// Map a row to a record in column order, typing each cell by its storage
/// class: INTEGER, REAL, TEXT, NULL, and BLOB (as lossy UTF-8 text).
fn row_to_record(row: &SqliteRow) -> std::result::Result<Record, sqlx::Error> {
    let mut pairs = Vec::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage = raw.type_info().name().to_ascii_uppercase();
            match storage.as_str() {
                "INTEGER" | "BOOLEAN" => Value::Int(row.try_get::<i64, _>(idx)?),
                "REAL" => Value::Float(row.try_get::<f64, _>(idx)?),
                "BLOB" => {
                    let bytes: Vec<u8> = row.try_get(idx)?;
                    Value::Str(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::Str(row.try_get::<String, _>(idx)?),
            }
        };
        pairs.push((column.name().to_string(), value));
    }
    Ok(Record::from_pairs(pairs))
}

#[async_trait]
impl RecordSource for TableSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "table"
    }

    fn location(&self) -> String {
        self.database.display().to_string()
    }

    async fn load(&self) -> Result<LoadOutcome> {
        if !self.database.exists() {
            return Err(PipelineError::SourceNotFound {
                location: self.location(),
            });
        }

        let pool = db::connect_readonly(&self.database)
            .await
            .map_err(|e| self.access_err(format!("{:#}", e)))?;
        let result = self.fetch(&pool).await;
        pool.close().await;

        let records = result?;
        debug!(source = %self.name, rows = records.len(), "table rows fetched");
        Ok(LoadOutcome {
            records,
            skipped: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn seed(path: &std::path::Path) {
        let pool = db::connect(path).await.unwrap();
        sqlx::query(
            "CREATE TABLE students (first_name TEXT, grade INTEGER, gpa REAL, note TEXT, photo BLOB)",
        )
        .execute(&pool)
        .await
        .unwrap();
        for (name, grade, gpa, note) in [
            ("Ada", 9i64, 3.9f64, Some("top")),
            ("Ben", 7, 3.1, None),
            ("Cy", 5, 2.4, Some("x")),
        ] {
            sqlx::query("INSERT INTO students VALUES (?, ?, ?, ?, ?)")
                .bind(name)
                .bind(grade)
                .bind(gpa)
                .bind(note)
                .bind(b"img".to_vec())
                .execute(&pool)
                .await
                .unwrap();
        }
        pool.close().await;
    }

    #[tokio::test]
    async fn loads_rows_with_bound_params() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("students.db");
        seed(&path).await;

        let source = TableSource::new(
            "students",
            &path,
            "SELECT first_name, grade, gpa, note, photo FROM students WHERE grade >= ? ORDER BY grade DESC",
        )
        .with_params(vec![Value::Int(7)]);
        let outcome = source.load().await.unwrap();

        assert_eq!(outcome.records.len(), 2);
        let ada = outcome.records.get(0).unwrap();
        assert_eq!(
            ada.field_names().collect::<Vec<_>>(),
            vec!["first_name", "grade", "gpa", "note", "photo"]
        );
        assert_eq!(ada.get("first_name"), Some(&Value::from("Ada")));
        assert_eq!(ada.get("grade"), Some(&Value::Int(9)));
        assert_eq!(ada.get("gpa"), Some(&Value::Float(3.9)));
        assert_eq!(ada.get("photo"), Some(&Value::from("img")));
        assert_eq!(outcome.records.get(1).unwrap().get("note"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn param_is_not_interpolated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("students.db");
        seed(&path).await;

        let source = TableSource::new(
            "students",
            &path,
            "SELECT first_name FROM students WHERE first_name = ?",
        )
        .with_params(vec![Value::from("Ada' OR '1'='1")]);
        let outcome = source.load().await.unwrap();
        assert!(outcome.records.is_empty());
    }

    #[tokio::test]
    async fn missing_database_is_not_found() {
        let dir = TempDir::new().unwrap();
        let source = TableSource::new("x", dir.path().join("nope.db"), "SELECT 1");
        assert!(matches!(
            source.load().await,
            Err(PipelineError::SourceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn bad_query_is_access_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("students.db");
        seed(&path).await;
        let source = TableSource::new("x", &path, "SELECT * FROM no_such_table");
        assert!(matches!(
            source.load().await,
            Err(PipelineError::SourceAccess { .. })
        ));
    }

    #[test]
    fn config_params_become_values() {
        assert_eq!(param_value(&SqlParam::Int(7)), Value::Int(7));
        assert_eq!(param_value(&SqlParam::Text("a".into())), Value::from("a"));
        assert_eq!(param_value(&SqlParam::Bool(true)), Value::Bool(true));
    }
}
