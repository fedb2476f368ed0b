//! SQLite executor
//!
//! The view schema is attached to the connection under the schema prefix, so
//! `DUI.v_caseheaders` resolves without rewriting view references. `SELECT TOP n`
//! is rewritten to a trailing `LIMIT n`; other SQL Server functions are passed
//! through and fail as ordinary execution errors.

use super::{QueryRows, SqlExecutor};
use crate::error::{DuiError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

lazy_static! {
    static ref SELECT_TOP: Regex = Regex::new(r"(?i)^\s*SELECT\s+TOP\s*\(?\s*(\d+)\s*\)?\s+").unwrap();
    static ref HAS_LIMIT: Regex = Regex::new(r"(?i)\bLIMIT\s+\d+").unwrap();
}

pub struct SqliteExecutor {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteExecutor {
    /// Open `path` and attach it again under `schema_prefix`.
    pub fn open(path: impl AsRef<Path>, schema_prefix: &str) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let location = path.to_string_lossy().into_owned();
        conn.execute(
            &format!("ATTACH DATABASE ?1 AS {}", quote_identifier(schema_prefix)),
            [location.as_str()],
        )?;
        info!("SQLite executor opened {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// In-memory database with an empty attached schema, mostly for tests.
    pub fn in_memory(schema_prefix: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&format!(
            "ATTACH DATABASE ':memory:' AS {};",
            quote_identifier(schema_prefix)
        ))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run setup statements such as fixture DDL.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| DuiError::Execution("SQLite connection poisoned".to_string()))?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

#[async_trait]
impl SqlExecutor for SqliteExecutor {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn execute(&self, sql: &str, max_rows: usize) -> Result<QueryRows> {
        let conn = self.conn.clone();
        let sql = translate_for_sqlite(sql);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| DuiError::Execution("SQLite connection poisoned".to_string()))?;
            fetch_rows(&conn, &sql, max_rows)
        })
        .await
        .map_err(|e| DuiError::Execution(format!("Execution task failed: {}", e)))?
    }
}

fn fetch_rows(conn: &Connection, sql: &str, max_rows: usize) -> Result<QueryRows> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = columns.len();

    let mut rows = Vec::new();
    let mut truncated = false;
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        if rows.len() == max_rows {
            truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            values.push(to_json(row.get_ref(idx)?));
        }
        rows.push(values);
    }

    Ok(QueryRows {
        columns,
        rows,
        truncated,
    })
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(bytes) => serde_json::Value::from(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => serde_json::Value::from(format!("<blob {} bytes>", bytes.len())),
    }
}

fn translate_for_sqlite(sql: &str) -> String {
    let sql = sql.trim().trim_end_matches(';');
    match SELECT_TOP.captures(sql) {
        Some(caps) if !HAS_LIMIT.is_match(sql) => {
            let limit = caps[1].to_string();
            format!("SELECT {} LIMIT {}", &sql[caps[0].len()..], limit)
        }
        _ => sql.to_string(),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SqliteExecutor {
        let executor = SqliteExecutor::in_memory("DUI").unwrap();
        let mut ddl = String::from(
            "CREATE TABLE DUI.v_caseheaders (CaseId INTEGER, CaseNumber TEXT, BacResult REAL);",
        );
        for i in 1..=150 {
            ddl.push_str(&format!(
                "INSERT INTO DUI.v_caseheaders VALUES ({}, 'C-{}', {});",
                i,
                i,
                i as f64 / 1000.0
            ));
        }
        executor.execute_batch(&ddl).unwrap();
        executor
    }

    #[test]
    fn test_translate_top() {
        assert_eq!(
            translate_for_sqlite("SELECT TOP 5 t.CaseId FROM DUI.v_caseheaders t ORDER BY t.CaseId DESC"),
            "SELECT t.CaseId FROM DUI.v_caseheaders t ORDER BY t.CaseId DESC LIMIT 5"
        );
        assert_eq!(
            translate_for_sqlite("SELECT t.CaseId FROM DUI.v_caseheaders t;"),
            "SELECT t.CaseId FROM DUI.v_caseheaders t"
        );
    }

    #[tokio::test]
    async fn test_rows_are_capped() {
        let executor = seeded();
        let rows = executor
            .execute("SELECT t.CaseId, t.CaseNumber FROM DUI.v_caseheaders t", 100)
            .await
            .unwrap();
        assert_eq!(rows.columns, vec!["CaseId", "CaseNumber"]);
        assert_eq!(rows.rows.len(), 100);
        assert!(rows.truncated);
        assert_eq!(rows.rows[0][1], serde_json::json!("C-1"));
    }

    #[tokio::test]
    async fn test_top_and_count() {
        let executor = seeded();
        let rows = executor
            .execute("SELECT TOP 3 t.CaseId FROM DUI.v_caseheaders t ORDER BY t.CaseId DESC", 100)
            .await
            .unwrap();
        assert_eq!(
            rows.rows,
            vec![vec![serde_json::json!(150)], vec![serde_json::json!(149)], vec![serde_json::json!(148)]]
        );
        assert!(!rows.truncated);

        let rows = executor
            .execute("SELECT COUNT(*) AS total_count FROM DUI.v_caseheaders t WHERE t.BacResult > 0.08", 100)
            .await
            .unwrap();
        assert_eq!(rows.rows, vec![vec![serde_json::json!(70)]]);
    }

    #[tokio::test]
    async fn test_unknown_view_is_an_error() {
        let executor = seeded();
        let err = executor
            .execute("SELECT x.a FROM DUI.v_missing x", 100)
            .await
            .unwrap_err();
        assert!(matches!(err, DuiError::Execution(_)));
    }
}
