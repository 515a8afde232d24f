use std::time::Duration;

use sqlx::AnyConnection;
use sqlx::Connection;
use tracing::debug;

use sqlup_core::config::DatabaseConfig;
use sqlup_core::error::{Result, SqlupError};

use super::Dialect;

/// Open the single connection an upgrade run works on.
pub async fn connect(config: &DatabaseConfig) -> Result<AnyConnection> {
    if !config.is_configured() {
        return Err(SqlupError::Config(
            "Missing configuration or environment variable for 'database.url'".to_string(),
        ));
    }

    // Fail early on unsupported schemes instead of on a driver lookup error
    Dialect::from_url(&config.url)?;

    sqlx::any::install_default_drivers();

    let timeout = Duration::from_secs(config.connect_timeout_secs);
    let conn = tokio::time::timeout(timeout, AnyConnection::connect(&config.url))
        .await
        .map_err(|_| {
            SqlupError::Database(format!(
                "Timed out after {}s connecting to database",
                config.connect_timeout_secs
            ))
        })?
        .map_err(|e| SqlupError::Database(format!("Failed to connect: {}", e)))?;

    debug!(backend = conn.backend_name(), "Database connection opened");
    Ok(conn)
}
