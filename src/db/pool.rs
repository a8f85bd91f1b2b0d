//! MySQL connection pool management.
//!
//! The pool is created once at process start and shared for the process
//! lifetime. Query execution borrows connections from the pool; closing the
//! manager drains the pool on shutdown.

use crate::config::{DEFAULT_ACQUIRE_TIMEOUT_SECS, DEFAULT_POOL_SIZE};
use crate::error::{ServerError, ServerResult};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// Pool sizing and acquisition options.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum connections in the pool
    pub max_connections: u32,
    /// How long to wait for a free connection before failing
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_POOL_SIZE,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

/// Manages the process-wide MySQL connection pool.
pub struct MySqlPoolManager {
    pool: RwLock<Option<MySqlPool>>,
}

impl MySqlPoolManager {
    /// Create an unconnected pool manager.
    pub fn new() -> Self {
        Self {
            pool: RwLock::new(None),
        }
    }

    /// Connect to the database and install the pool.
    pub async fn connect(&self, url: &str, settings: PoolSettings) -> ServerResult<()> {
        let pool = MySqlPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
            .await
            .map_err(ServerError::from)?;

        info!(
            max_connections = settings.max_connections,
            "MySQL connection pool created"
        );
        *self.pool.write().await = Some(pool);
        Ok(())
    }

    /// Get a handle to the pool, or a connection error if not connected.
    pub async fn pool(&self) -> ServerResult<MySqlPool> {
        self.pool.read().await.clone().ok_or_else(|| {
            ServerError::connection(
                "Database pool is not connected",
                "Check the MySQL connection settings and server status",
            )
        })
    }

    /// Whether the pool has been connected.
    pub async fn is_connected(&self) -> bool {
        self.pool.read().await.is_some()
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
            info!("MySQL connection pool closed");
        }
    }
}

impl Default for MySqlPoolManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconnected_manager_reports_error() {
        let manager = MySqlPoolManager::new();
        assert!(!manager.is_connected().await);
        let err = manager.pool().await.unwrap_err();
        assert!(matches!(err, ServerError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_close_on_unconnected_manager_is_noop() {
        let manager = MySqlPoolManager::new();
        manager.close().await;
        assert!(!manager.is_connected().await);
    }

    #[test]
    fn test_pool_settings_defaults() {
        let settings = PoolSettings::default();
        assert_eq!(settings.max_connections, DEFAULT_POOL_SIZE);
        assert_eq!(
            settings.acquire_timeout,
            Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS)
        );
    }
}
