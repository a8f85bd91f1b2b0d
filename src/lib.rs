//! MySQL MCP Server Library
//!
//! This library provides an MCP (Model Context Protocol) server exposing a
//! single read-only `query` tool for MySQL databases over the SSE transport.

pub mod config;
pub mod db;
pub mod error;
pub mod protocol;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::ServerError;
pub use protocol::ProtocolEngine;
pub use transport::SessionRegistry;
