//! Query execution engine.
//!
//! Executes validated read-only statements with a row limit (enforced via
//! streaming - only the needed rows are fetched) and a timeout, and converts
//! the resulting rows to JSON.

use crate::db::types::{column_names, row_to_json_map};
use crate::error::{ServerError, ServerResult};
use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlRow;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default row limit for query results.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Maximum allowed row limit.
pub const MAX_ROW_LIMIT: u32 = 10_000;

/// Maximum query timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u32 = 300;

/// Result of a read-only query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// True if more rows were available than the limit allowed
    pub truncated: bool,
    pub execution_time_ms: u64,
}

/// Executes queries against the MySQL pool.
pub struct QueryExecutor {
    default_timeout: Duration,
    default_limit: u32,
}

impl QueryExecutor {
    /// Create a new query executor with default settings.
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(crate::config::DEFAULT_QUERY_TIMEOUT_SECS),
            default_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Create a new query executor with custom settings.
    pub fn with_defaults(timeout_secs: u64, row_limit: u32) -> Self {
        Self {
            default_timeout: Duration::from_secs(timeout_secs),
            default_limit: row_limit.min(MAX_ROW_LIMIT),
        }
    }

    /// Execute a read-only statement and collect up to `limit` rows.
    ///
    /// The caller is responsible for validating the statement beforehand;
    /// this method only runs it.
    pub async fn fetch(
        &self,
        pool: &MySqlPool,
        sql: &str,
        limit: Option<u32>,
        timeout_secs: Option<u32>,
    ) -> ServerResult<QueryResult> {
        let start = Instant::now();
        // Clamp limit to [1, MAX_ROW_LIMIT] to avoid the edge case where
        // limit=0 marks every result as truncated
        let row_limit = limit
            .map(|l| l.clamp(1, MAX_ROW_LIMIT))
            .unwrap_or(self.default_limit);
        let query_timeout = timeout_secs
            .map(|t| Duration::from_secs(t.min(MAX_QUERY_TIMEOUT_SECS) as u64))
            .unwrap_or(self.default_timeout);

        debug!(
            sql = %sql,
            limit = row_limit,
            timeout_secs = query_timeout.as_secs(),
            "Executing query"
        );

        // Fetch limit+1 rows so truncation can be detected without
        // pulling the full result set
        let fetch_limit = row_limit as usize + 1;
        let rows_future = {
            use sqlx::Executor;
            let stream = pool.fetch(sql);
            stream.take(fetch_limit).collect::<Vec<_>>()
        };

        let results = match timeout(query_timeout, rows_future).await {
            Ok(results) => results,
            Err(_) => {
                warn!(
                    timeout_secs = query_timeout.as_secs(),
                    "Query timed out"
                );
                return Err(ServerError::timeout(
                    "query execution",
                    query_timeout.as_secs() as u32,
                ));
            }
        };

        let mut rows = Vec::with_capacity(results.len());
        for result in results {
            rows.push(result.map_err(ServerError::from)?);
        }

        Ok(process_rows(rows, row_limit, start))
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert fetched rows into a QueryResult, applying the row limit.
fn process_rows(rows: Vec<MySqlRow>, row_limit: u32, start: Instant) -> QueryResult {
    let execution_time_ms = start.elapsed().as_millis() as u64;

    if rows.is_empty() {
        return QueryResult {
            columns: Vec::new(),
            rows: Vec::new(),
            truncated: false,
            execution_time_ms,
        };
    }

    let columns = column_names(&rows[0]);
    let total_rows = rows.len();
    let truncated = total_rows > row_limit as usize;
    let rows_to_take = (row_limit as usize).min(total_rows);

    let json_rows: Vec<serde_json::Map<String, JsonValue>> =
        rows.iter().take(rows_to_take).map(row_to_json_map).collect();

    if truncated {
        warn!(
            total_rows = total_rows,
            limit = row_limit,
            "Query result truncated"
        );
    }

    QueryResult {
        columns,
        rows: json_rows,
        truncated,
        execution_time_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_defaults() {
        let executor = QueryExecutor::new();
        assert_eq!(
            executor.default_timeout,
            Duration::from_secs(crate::config::DEFAULT_QUERY_TIMEOUT_SECS)
        );
        assert_eq!(executor.default_limit, DEFAULT_ROW_LIMIT);
    }

    #[test]
    fn test_executor_custom_settings() {
        let executor = QueryExecutor::with_defaults(60, 500);
        assert_eq!(executor.default_timeout, Duration::from_secs(60));
        assert_eq!(executor.default_limit, 500);
    }

    #[test]
    fn test_executor_limit_capped() {
        let executor = QueryExecutor::with_defaults(30, 99_999);
        assert_eq!(executor.default_limit, MAX_ROW_LIMIT);
    }

    #[test]
    fn test_process_rows_empty() {
        let result = process_rows(Vec::new(), 100, Instant::now());
        assert!(result.columns.is_empty());
        assert!(result.rows.is_empty());
        assert!(!result.truncated);
    }
}
