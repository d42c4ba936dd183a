//! Database operations for `PostgreSQL`.
//!
//! ## Tables
//!
//! - `drafts` - In-progress tributes keyed by slug (status `draft` | `paid`)
//! - `stories` / `story_moments` - Published tributes and their moments
//! - `users` - Accounts identified by email
//! - `user_passkeys` - `WebAuthn` passkeys
//! - `user_sessions` - Hashed `dash_session` tokens
//! - `email_otps` - Hashed one-time sign-in codes
//! - `tower_sessions.session` - Passkey ceremony state (tower-sessions)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p dash-memories-cli -- migrate
//! ```

pub mod drafts;
pub mod otps;
pub mod sessions;
pub mod stories;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use drafts::{DraftOwner, DraftRepository, SaveDraft};
pub use otps::OtpRepository;
pub use sessions::SessionRepository;
pub use stories::{NewMoment, StoryRepository};
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique slug).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map a unique violation to `Conflict`, anything else to `Database`.
pub(crate) fn conflict_or_database(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
