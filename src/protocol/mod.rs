//! MCP protocol layer.
//!
//! JSON-RPC message types and the per-session protocol engine that drains a
//! session's receive queue and publishes response frames on its send queue.

pub mod engine;
pub mod message;

pub use engine::{ProtocolEngine, PROTOCOL_VERSION};
pub use message::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, error_codes};
