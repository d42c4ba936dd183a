//! One-time sign-in codes. Codes are stored hashed.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use dash_memories_core::{Email, OtpId};

use super::RepositoryError;

/// A stored, unused sign-in code.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OtpRecord {
    pub id: OtpId,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Repository for `email_otps`.
pub struct OtpRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OtpRepository<'a> {
    /// Create a new OTP repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Remove this email's used or expired codes older than `older_than`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn purge(&self, email: &Email, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM email_otps
            WHERE email = $1
              AND (used_at IS NOT NULL OR expires_at < now())
              AND created_at < $2
            ",
        )
        .bind(email.as_str())
        .bind(older_than)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Store a hashed code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn insert(
        &self,
        email: &Email,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<OtpId, RepositoryError> {
        let id: i32 = sqlx::query_scalar(
            "INSERT INTO email_otps (email, code_hash, expires_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(email.as_str())
        .bind(code_hash)
        .bind(expires_at)
        .fetch_one(self.pool)
        .await?;
        Ok(OtpId::new(id))
    }

    /// The newest unused codes for an email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recent_unused(&self, email: &Email, limit: i64) -> Result<Vec<OtpRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, OtpRecord>(
            r"
            SELECT id, code_hash, expires_at
            FROM email_otps
            WHERE email = $1 AND used_at IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            ",
        )
        .bind(email.as_str())
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Mark a code as used. Returns false if it was already consumed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_used(&self, id: OtpId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE email_otps SET used_at = now() WHERE id = $1 AND used_at IS NULL")
                .bind(id.as_i32())
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}
