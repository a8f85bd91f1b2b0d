//! SQL statement validation for read-only enforcement.
//!
//! Ensures that the `query` tool only executes read-only SQL statements
//! (SELECT, SHOW, DESCRIBE, EXPLAIN over reads). Everything else - DML
//! writes, DDL, transaction control, procedure calls, administrative
//! statements - is blocked.
//!
//! Uses [sqlparser](https://docs.rs/sqlparser/) with the MySQL dialect for
//! AST-based validation, so no write operation can slip through via
//! formatting tricks or keyword prefixes inside comments.

use crate::error::{ServerError, ServerResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

/// Type of SQL statement detected by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlStatementType {
    /// SELECT and other read-only queries (SELECT, SHOW, DESCRIBE, EXPLAIN)
    Select,
    /// INSERT, UPDATE, DELETE, MERGE, REPLACE
    DmlWrite,
    /// CREATE, DROP, ALTER, TRUNCATE, RENAME
    Ddl,
    /// BEGIN, COMMIT, ROLLBACK, SAVEPOINT, RELEASE
    Transaction,
    /// CALL, EXECUTE, PREPARE
    ProcedureCall,
    /// GRANT, REVOKE, SET, LOCK, FLUSH, KILL
    Administrative,
    /// Unknown or unparseable statement
    Unknown,
}

mod error_messages {
    pub const DML_WRITE: &str =
        "Write operations are not allowed. Only read-only queries can be executed.";
    pub const DDL: &str = "Schema modifications are not allowed.";
    pub const TRANSACTION: &str = "Transaction control statements are not allowed.";
    pub const PROCEDURE: &str = "Procedure calls are not allowed.";
    pub const ADMINISTRATIVE: &str = "Administrative statements are not allowed.";
    pub const UNKNOWN: &str = "Unrecognized SQL statement. Only read-only queries are allowed.";
    pub const PARSE_ERROR: &str = "Failed to parse SQL statement.";
}

/// Validate SQL for read-only execution.
///
/// Returns `Ok(())` if every statement is read-only (SELECT, SHOW, EXPLAIN
/// over a read), or `Err(ServerError::Permission)` for write operations.
///
/// # Examples
///
/// ```
/// use mysql_mcp_server::tools::sql_validator::validate_readonly;
///
/// // SELECT is allowed
/// assert!(validate_readonly("SELECT * FROM users").is_ok());
///
/// // INSERT is blocked
/// assert!(validate_readonly("INSERT INTO users VALUES (1)").is_err());
/// ```
pub fn validate_readonly(sql: &str) -> ServerResult<()> {
    let dialect = MySqlDialect {};

    let statements = Parser::parse_sql(&dialect, sql).map_err(|e| {
        ServerError::invalid_input(format!("{} Error: {}", error_messages::PARSE_ERROR, e))
    })?;

    if statements.is_empty() {
        return Err(ServerError::invalid_input("Empty SQL statement"));
    }

    for stmt in statements {
        validate_statement(&stmt)?;
    }

    Ok(())
}

/// Validate a single parsed statement.
fn validate_statement(stmt: &Statement) -> ServerResult<()> {
    let (stmt_type, operation_name) = classify_statement(stmt);

    match stmt_type {
        SqlStatementType::Select => Ok(()),
        SqlStatementType::DmlWrite => Err(ServerError::permission(
            operation_name,
            error_messages::DML_WRITE,
        )),
        SqlStatementType::Ddl => Err(ServerError::permission(operation_name, error_messages::DDL)),
        SqlStatementType::Transaction => Err(ServerError::permission(
            operation_name,
            error_messages::TRANSACTION,
        )),
        SqlStatementType::ProcedureCall => Err(ServerError::permission(
            operation_name,
            error_messages::PROCEDURE,
        )),
        SqlStatementType::Administrative => Err(ServerError::permission(
            operation_name,
            error_messages::ADMINISTRATIVE,
        )),
        SqlStatementType::Unknown => {
            Err(ServerError::permission(operation_name, error_messages::UNKNOWN))
        }
    }
}

/// Classify a parsed statement into a statement type.
fn classify_statement(stmt: &Statement) -> (SqlStatementType, &'static str) {
    match stmt {
        // Read-only operations - allowed
        Statement::Query(_) => (SqlStatementType::Select, "SELECT"),
        Statement::ShowTables { .. } => (SqlStatementType::Select, "SHOW TABLES"),
        Statement::ShowColumns { .. } => (SqlStatementType::Select, "SHOW COLUMNS"),
        Statement::ShowDatabases { .. } => (SqlStatementType::Select, "SHOW DATABASES"),
        Statement::ShowCreate { .. } => (SqlStatementType::Select, "SHOW CREATE"),
        Statement::ShowVariable { .. } => (SqlStatementType::Select, "SHOW VARIABLE"),
        Statement::ShowVariables { .. } => (SqlStatementType::Select, "SHOW VARIABLES"),
        Statement::ShowStatus { .. } => (SqlStatementType::Select, "SHOW STATUS"),
        Statement::ShowCollation { .. } => (SqlStatementType::Select, "SHOW COLLATION"),
        Statement::ExplainTable { .. } => (SqlStatementType::Select, "EXPLAIN TABLE"),

        // EXPLAIN is only allowed over a read-only statement
        Statement::Explain { statement, .. } => {
            let (inner_type, inner_name) = classify_statement(statement);
            if inner_type == SqlStatementType::Select {
                (SqlStatementType::Select, "EXPLAIN")
            } else {
                (inner_type, inner_name)
            }
        }

        // DML writes - blocked
        Statement::Insert(_) => (SqlStatementType::DmlWrite, "INSERT"),
        Statement::Update { .. } => (SqlStatementType::DmlWrite, "UPDATE"),
        Statement::Delete(_) => (SqlStatementType::DmlWrite, "DELETE"),
        Statement::Merge { .. } => (SqlStatementType::DmlWrite, "MERGE"),
        Statement::Copy { .. } => (SqlStatementType::DmlWrite, "COPY"),

        // DDL - blocked
        Statement::CreateTable { .. } => (SqlStatementType::Ddl, "CREATE TABLE"),
        Statement::CreateView { .. } => (SqlStatementType::Ddl, "CREATE VIEW"),
        Statement::CreateIndex(_) => (SqlStatementType::Ddl, "CREATE INDEX"),
        Statement::CreateDatabase { .. } => (SqlStatementType::Ddl, "CREATE DATABASE"),
        Statement::CreateFunction { .. } => (SqlStatementType::Ddl, "CREATE FUNCTION"),
        Statement::CreateProcedure { .. } => (SqlStatementType::Ddl, "CREATE PROCEDURE"),
        Statement::CreateTrigger { .. } => (SqlStatementType::Ddl, "CREATE TRIGGER"),
        Statement::CreateVirtualTable { .. } => (SqlStatementType::Ddl, "CREATE VIRTUAL TABLE"),
        Statement::AlterTable { .. } => (SqlStatementType::Ddl, "ALTER TABLE"),
        Statement::AlterView { .. } => (SqlStatementType::Ddl, "ALTER VIEW"),
        Statement::AlterIndex { .. } => (SqlStatementType::Ddl, "ALTER INDEX"),
        Statement::Drop { .. } => (SqlStatementType::Ddl, "DROP"),
        Statement::DropFunction { .. } => (SqlStatementType::Ddl, "DROP FUNCTION"),
        Statement::DropProcedure { .. } => (SqlStatementType::Ddl, "DROP PROCEDURE"),
        Statement::DropTrigger { .. } => (SqlStatementType::Ddl, "DROP TRIGGER"),
        Statement::Truncate { .. } => (SqlStatementType::Ddl, "TRUNCATE"),

        // Transaction control - blocked
        Statement::StartTransaction { .. } => (SqlStatementType::Transaction, "BEGIN"),
        Statement::Commit { .. } => (SqlStatementType::Transaction, "COMMIT"),
        Statement::Rollback { .. } => (SqlStatementType::Transaction, "ROLLBACK"),
        Statement::Savepoint { .. } => (SqlStatementType::Transaction, "SAVEPOINT"),
        Statement::ReleaseSavepoint { .. } => (SqlStatementType::Transaction, "RELEASE SAVEPOINT"),

        // Procedure/prepared statement handling - blocked (behavior cannot be verified)
        Statement::Call { .. } => (SqlStatementType::ProcedureCall, "CALL"),
        Statement::Execute { .. } => (SqlStatementType::ProcedureCall, "EXECUTE"),
        Statement::Prepare { .. } => (SqlStatementType::ProcedureCall, "PREPARE"),
        Statement::Deallocate { .. } => (SqlStatementType::ProcedureCall, "DEALLOCATE"),

        // Administrative operations - blocked
        Statement::Grant { .. } => (SqlStatementType::Administrative, "GRANT"),
        Statement::Revoke { .. } => (SqlStatementType::Administrative, "REVOKE"),
        Statement::Set(_) => (SqlStatementType::Administrative, "SET"),
        Statement::Use(_) => (SqlStatementType::Administrative, "USE"),
        Statement::Kill { .. } => (SqlStatementType::Administrative, "KILL"),
        Statement::LockTables { .. } => (SqlStatementType::Administrative, "LOCK"),
        Statement::UnlockTables => (SqlStatementType::Administrative, "UNLOCK"),
        Statement::Flush { .. } => (SqlStatementType::Administrative, "FLUSH"),
        Statement::Analyze { .. } => (SqlStatementType::Administrative, "ANALYZE"),
        Statement::OptimizeTable { .. } => (SqlStatementType::Administrative, "OPTIMIZE"),

        // Unknown/other statements - blocked (conservative approach)
        _ => (SqlStatementType::Unknown, "Unknown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_readonly_select_ok() {
        assert!(validate_readonly("SELECT * FROM users").is_ok());
    }

    #[test]
    fn test_validate_readonly_show_tables_ok() {
        assert!(validate_readonly("SHOW TABLES").is_ok());
    }

    #[test]
    fn test_validate_readonly_insert_error() {
        let result = validate_readonly("INSERT INTO users VALUES (1)");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ServerError::Permission { .. }));
    }

    #[test]
    fn test_validate_readonly_update_error() {
        assert!(validate_readonly("UPDATE users SET name = 'test'").is_err());
    }

    #[test]
    fn test_validate_readonly_create_error() {
        assert!(validate_readonly("CREATE TABLE test (id INT)").is_err());
    }

    #[test]
    fn test_validate_readonly_drop_error() {
        assert!(validate_readonly("DROP TABLE users").is_err());
    }

    #[test]
    fn test_validate_readonly_empty_error() {
        let err = validate_readonly("   ").unwrap_err();
        assert!(matches!(err, ServerError::InvalidInput { .. }));
    }

    #[test]
    fn test_explain_select_allowed() {
        assert!(validate_readonly("EXPLAIN SELECT * FROM users").is_ok());
    }

    #[test]
    fn test_explain_delete_blocked() {
        assert!(validate_readonly("EXPLAIN DELETE FROM users").is_err());
    }

    #[test]
    fn test_complex_select_with_subquery() {
        let sql = r#"
            SELECT u.name, (SELECT COUNT(*) FROM orders WHERE user_id = u.id) as order_count
            FROM users u
            WHERE u.id IN (SELECT user_id FROM active_users)
        "#;
        assert!(validate_readonly(sql).is_ok());
    }

    #[test]
    fn test_select_with_union() {
        assert!(validate_readonly("SELECT a FROM t1 UNION ALL SELECT b FROM t2").is_ok());
    }

    #[test]
    fn test_multiple_statements_blocked() {
        // If any statement is a write, the whole input is rejected
        assert!(validate_readonly("SELECT 1; INSERT INTO users VALUES (1)").is_err());
    }

    #[test]
    fn test_insert_select_blocked() {
        // INSERT ... SELECT is blocked even though it contains a SELECT
        let sql = "INSERT INTO archive SELECT * FROM users WHERE created_at < '2020-01-01'";
        assert!(validate_readonly(sql).is_err());
    }

    #[test]
    fn test_transaction_control_blocked() {
        assert!(validate_readonly("COMMIT").is_err());
        assert!(validate_readonly("START TRANSACTION").is_err());
    }

    #[test]
    fn test_set_and_use_blocked() {
        assert!(validate_readonly("SET SESSION sql_mode = ''").is_err());
        assert!(validate_readonly("USE other_db").is_err());
    }

    #[test]
    fn test_call_blocked() {
        assert!(validate_readonly("CALL some_procedure()").is_err());
    }
}
