//! Tool implementations exposed through the MCP protocol.
//!
//! Exactly one tool is registered: `query`, which executes read-only SQL.

pub mod query;
pub mod sql_validator;

pub use query::{QueryInput, QueryOutput, QueryToolHandler};
