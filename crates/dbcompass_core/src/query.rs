use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single result row: column name to value, in column order.
pub type Row = IndexMap<String, serde_json::Value>;

/// Raw result of one adapter-level query execution.
///
/// Row-shaped results carry `columns` and `rows`; statement-shaped results
/// (INSERT/UPDATE/DELETE/DDL) carry `affected_rows` and no columns.
/// Invariant: every key of every row appears in `columns`.
#[derive(Debug, Clone, Default)]
pub struct QueryData {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub affected_rows: Option<u64>,

    /// Wall-clock time of the native call, measured by the adapter.
    pub execution_time: Duration,
}

impl QueryData {
    pub fn rows(columns: Vec<String>, rows: Vec<Row>, execution_time: Duration) -> Self {
        Self {
            columns,
            rows,
            affected_rows: None,
            execution_time,
        }
    }

    pub fn affected(count: u64, execution_time: Duration) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: Some(count),
            execution_time,
        }
    }

    /// Row count as reported to callers: result rows for row-shaped
    /// results, the affected-row count otherwise.
    pub fn row_count(&self) -> u64 {
        self.affected_rows.unwrap_or(self.rows.len() as u64)
    }
}

/// The uniform result envelope returned across the service boundary.
///
/// Success or failure is a value here, never an exception: the UI
/// collaborator gets one reply shape for both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    pub columns: Vec<String>,
    pub data: Vec<Row>,
    pub row_count: u64,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    pub fn from_data(data: QueryData) -> Self {
        Self {
            success: true,
            row_count: data.row_count(),
            execution_time_ms: data.execution_time.as_millis() as u64,
            columns: data.columns,
            data: data.rows,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            columns: Vec::new(),
            data: Vec::new(),
            row_count: 0,
            execution_time_ms: 0,
            error: Some(error.into()),
        }
    }
}
