//! MySQL MCP Server - Main entry point.
//!
//! This server exposes a single read-only `query` tool over the MCP SSE
//! transport, backed by a MySQL connection pool.

use clap::Parser;
use mysql_mcp_server::config::Config;
use mysql_mcp_server::db::{MySqlPoolManager, PoolSettings, QueryExecutor};
use mysql_mcp_server::protocol::ProtocolEngine;
use mysql_mcp_server::tools::QueryToolHandler;
use mysql_mcp_server::transport::HttpTransport;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from environment and command line
    let config = Config::parse();

    init_tracing(&config);

    info!("Starting MySQL MCP Server v{}", env!("CARGO_PKG_VERSION"));

    let url = config.connection_url()?;
    info!(
        database = %config.redacted_url(),
        pool_size = config.pool_size,
        "Connecting to MySQL"
    );

    let pool = Arc::new(MySqlPoolManager::new());
    pool.connect(
        url.as_str(),
        PoolSettings {
            max_connections: config.pool_size,
            acquire_timeout: config.acquire_timeout_duration(),
        },
    )
    .await?;

    let executor = QueryExecutor::with_defaults(
        config.query_timeout,
        mysql_mcp_server::db::DEFAULT_ROW_LIMIT,
    );
    let query_tool = Arc::new(QueryToolHandler::new(pool.clone(), executor));
    let engine = Arc::new(ProtocolEngine::new(query_tool));

    info!(
        addr = %config.bind_addr(),
        sse = %config.sse_path,
        messages = %config.messages_path,
        "MCP SSE server starting"
    );

    let transport = HttpTransport::new(
        engine,
        &config.host,
        config.port,
        &config.sse_path,
        &config.messages_path,
    );
    let result = transport.run().await;

    // Close database connections
    info!("Closing database connections");
    pool.close().await;

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
