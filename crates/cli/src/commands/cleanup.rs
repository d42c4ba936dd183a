//! Maintenance commands.
//!
//! `cleanup` runs the same sweep as `POST /api/cron/cleanup`, for operators
//! without an HTTP scheduler.
//!
//! # Environment Variables
//!
//! Reads the full server configuration (`DATABASE_URL`, `SUPABASE_URL`,
//! `SUPABASE_SERVICE_ROLE_KEY`, bucket names).

use chrono::Utc;
use thiserror::Error;

use dash_memories_server::config::{ConfigError, DashConfig};
use dash_memories_server::db::{self, RepositoryError, SessionRepository};
use dash_memories_server::services::cleanup;
use dash_memories_server::services::storage::{StorageClient, StorageError};

/// Errors that can occur during maintenance commands.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("Storage client error: {0}")]
    Storage(#[from] StorageError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Run the cleanup sweep and print its report as JSON.
///
/// # Errors
///
/// Returns `MaintenanceError` if configuration or connection fails. Query
/// failures inside the sweep are logged and reported as zero.
pub async fn run() -> Result<(), MaintenanceError> {
    let config = DashConfig::from_env()?;
    let pool = db::create_pool(&config.database_url).await?;
    let storage = StorageClient::new(&config.storage)?;

    let report = cleanup::run(
        &pool,
        &storage,
        &config.storage.temp_video_bucket,
        Utc::now(),
    )
    .await;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

/// Delete expired sign-in sessions.
///
/// # Errors
///
/// Returns `MaintenanceError` if configuration, connection or the delete fails.
pub async fn prune_sessions() -> Result<(), MaintenanceError> {
    let config = DashConfig::from_env()?;
    let pool = db::create_pool(&config.database_url).await?;

    let removed = SessionRepository::new(&pool).delete_expired().await?;
    tracing::info!(removed, "Expired sessions deleted");
    Ok(())
}
