//! Query execution tool.
//!
//! Implements the single `query` MCP tool: validate that the statement is
//! read-only, execute it against the shared pool, and shape the result.

use crate::db::{MySqlPoolManager, QueryExecutor, QueryResult};
use crate::error::{ServerError, ServerResult};
use crate::tools::sql_validator;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

/// Input for the query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// SQL SELECT statement to execute. Write operations (INSERT/UPDATE/DELETE/DDL) are blocked.
    pub sql: String,
    /// Maximum rows to return. Default: 100, max: 10000
    #[serde(default)]
    pub limit: Option<u32>,
    /// Query timeout in seconds. Default from server config, max: 300
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

/// Output from the query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueryOutput {
    /// Column names in declaration order
    pub columns: Vec<String>,
    /// Result rows as key-value maps
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Number of rows returned
    pub row_count: usize,
    /// True if the result was truncated due to the row limit
    pub truncated: bool,
    /// Query execution time in milliseconds
    pub execution_time_ms: u64,
}

impl From<QueryResult> for QueryOutput {
    fn from(result: QueryResult) -> Self {
        let row_count = result.rows.len();
        Self {
            columns: result.columns,
            rows: result.rows,
            row_count,
            truncated: result.truncated,
            execution_time_ms: result.execution_time_ms,
        }
    }
}

/// Handler for the query tool.
pub struct QueryToolHandler {
    pool: Arc<MySqlPoolManager>,
    executor: QueryExecutor,
}

impl QueryToolHandler {
    /// Create a new query tool handler over the shared pool.
    pub fn new(pool: Arc<MySqlPoolManager>, executor: QueryExecutor) -> Self {
        Self { pool, executor }
    }

    /// Execute a read-only query.
    ///
    /// Validation happens before the pool is touched, so a rejected statement
    /// never reaches the database.
    pub async fn query(&self, input: QueryInput) -> ServerResult<QueryOutput> {
        let sql = input.sql.trim();
        if sql.is_empty() {
            return Err(ServerError::invalid_input(
                "The 'sql' argument must not be empty",
            ));
        }

        sql_validator::validate_readonly(sql)?;

        let pool = self.pool.pool().await?;
        let result = self
            .executor
            .fetch(&pool, sql, input.limit, input.timeout_secs)
            .await?;

        info!(
            rows = result.rows.len(),
            truncated = result.truncated,
            elapsed_ms = result.execution_time_ms,
            "Query completed"
        );

        Ok(QueryOutput::from(result))
    }
}
