//! Execution boundary
//!
//! Running validated SQL is optional and goes through an injected
//! [`SqlExecutor`]. Results are always capped at [`MAX_RESULT_ROWS`].

pub mod sqlite_engine;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use sqlite_engine::SqliteExecutor;

pub const MAX_RESULT_ROWS: usize = 100;

/// Rows returned by an executor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// More rows were available than `max_rows`
    pub truncated: bool,
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, sql: &str, max_rows: usize) -> Result<QueryRows>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub executed: bool,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub rows_returned: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ExecutionOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn completed(rows: QueryRows) -> Self {
        Self {
            executed: true,
            rows_returned: rows.rows.len(),
            columns: rows.columns,
            rows: rows.rows,
            truncated: rows.truncated,
            reason: None,
        }
    }
}
