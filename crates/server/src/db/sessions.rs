//! `dash_session` token storage.
//!
//! Only the SHA-256 hash of a session token is ever written.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use dash_memories_core::{Email, SessionId, UserId};

use super::RepositoryError;
use crate::models::CurrentUser;

#[derive(sqlx::FromRow)]
struct SessionUserRow {
    session_id: i32,
    user_id: i32,
    email: String,
    expires_at: DateTime<Utc>,
}

/// A stored session joined with its user.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub id: SessionId,
    pub user: CurrentUser,
    pub expires_at: DateTime<Utc>,
}

impl TryFrom<SessionUserRow> for StoredSession {
    type Error = RepositoryError;

    fn try_from(row: SessionUserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        Ok(Self {
            id: SessionId::new(row.session_id),
            user: CurrentUser {
                id: UserId::new(row.user_id),
                email,
            },
            expires_at: row.expires_at,
        })
    }
}

/// Repository for user sessions.
pub struct SessionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SessionRepository<'a> {
    /// Create a new session repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a new session.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        user_id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionId, RepositoryError> {
        let id: i32 = sqlx::query_scalar(
            "INSERT INTO user_sessions (user_id, token_hash, expires_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(user_id.as_i32())
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(self.pool)
        .await?;
        Ok(SessionId::new(id))
    }

    /// Look up a session by token hash, regardless of expiry.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<StoredSession>, RepositoryError> {
        sqlx::query_as::<_, SessionUserRow>(
            r"
            SELECT s.id AS session_id, u.id AS user_id, u.email, s.expires_at
            FROM user_sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = $1
            ",
        )
        .bind(token_hash)
        .fetch_optional(self.pool)
        .await?
        .map(StoredSession::try_from)
        .transpose()
    }

    /// Replace a session's token and extend its expiry.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the session no longer exists.
    pub async fn rotate(
        &self,
        id: SessionId,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE user_sessions SET token_hash = $2, expires_at = $3, last_seen_at = now() WHERE id = $1",
        )
        .bind(id.as_i32())
        .bind(new_hash)
        .bind(expires_at)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete the session with this token hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_by_hash(&self, token_hash: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM user_sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete every expired session.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= now()")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
