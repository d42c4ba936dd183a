//! User repository for database operations.
//!
//! This module provides database access for users and their `WebAuthn` passkeys.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use webauthn_rs::prelude::Passkey;

use dash_memories_core::{CredentialId, Email, UserId};

use super::{RepositoryError, conflict_or_database};
use crate::models::{User, UserPasskey};

const USER_COLUMNS: &str = "id, email, webauthn_user_id, created_at";
const PASSKEY_COLUMNS: &str = "id, user_id, credential_id, passkey, name, created_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i32,
    email: String,
    webauthn_user_id: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        Ok(Self {
            id: UserId::new(row.id),
            email,
            webauthn_user_id: row.webauthn_user_id,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PasskeyRow {
    id: i32,
    user_id: i32,
    credential_id: Vec<u8>,
    passkey: sqlx::types::Json<serde_json::Value>,
    name: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PasskeyRow> for UserPasskey {
    type Error = RepositoryError;

    fn try_from(row: PasskeyRow) -> Result<Self, Self::Error> {
        let passkey: Passkey = serde_json::from_value(row.passkey.0)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid passkey data: {e}")))?;
        Ok(Self {
            id: CredentialId::new(row.id),
            user_id: UserId::new(row.user_id),
            webauthn_id: row.credential_id,
            passkey,
            name: row.name,
            created_at: row.created_at,
        })
    }
}

fn passkey_json(passkey: &Passkey) -> Result<serde_json::Value, RepositoryError> {
    serde_json::to_value(passkey)
        .map_err(|e| RepositoryError::DataCorruption(format!("failed to serialize passkey: {e}")))
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email.as_str())
            .fetch_optional(self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.as_i32())
            .fetch_optional(self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    /// Get the user for an email, creating the account on first sign-in.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create(&self, email: &Email) -> Result<User, RepositoryError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let sql = format!(
            "INSERT INTO users (email, webauthn_user_id) VALUES ($1, $2) \
             ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email.as_str())
            .bind(Uuid::new_v4())
            .fetch_one(self.pool)
            .await?
            .try_into()
    }

    /// Get all passkeys for a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if any passkey data is invalid.
    pub async fn get_passkeys(&self, user_id: UserId) -> Result<Vec<UserPasskey>, RepositoryError> {
        let sql = format!(
            "SELECT {PASSKEY_COLUMNS} FROM user_passkeys WHERE user_id = $1 ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, PasskeyRow>(&sql)
            .bind(user_id.as_i32())
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(UserPasskey::try_from)
            .collect()
    }

    /// Count passkeys registered to a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_passkeys(&self, user_id: UserId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_passkeys WHERE user_id = $1")
            .bind(user_id.as_i32())
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Store a newly registered passkey.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the credential ID already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create_passkey(
        &self,
        user_id: UserId,
        passkey: &Passkey,
        name: &str,
    ) -> Result<UserPasskey, RepositoryError> {
        let sql = format!(
            "INSERT INTO user_passkeys (user_id, credential_id, passkey, name) \
             VALUES ($1, $2, $3, $4) RETURNING {PASSKEY_COLUMNS}"
        );
        sqlx::query_as::<_, PasskeyRow>(&sql)
            .bind(user_id.as_i32())
            .bind(passkey.cred_id().as_ref())
            .bind(sqlx::types::Json(passkey_json(passkey)?))
            .bind(name)
            .fetch_one(self.pool)
            .await
            .map_err(|e| conflict_or_database(e, "credential"))?
            .try_into()
    }

    /// Get a passkey by its `WebAuthn` credential ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the passkey data is invalid.
    pub async fn get_passkey_by_webauthn_id(
        &self,
        credential_id: &[u8],
    ) -> Result<Option<UserPasskey>, RepositoryError> {
        let sql = format!("SELECT {PASSKEY_COLUMNS} FROM user_passkeys WHERE credential_id = $1");
        sqlx::query_as::<_, PasskeyRow>(&sql)
            .bind(credential_id)
            .fetch_optional(self.pool)
            .await?
            .map(UserPasskey::try_from)
            .transpose()
    }

    /// Persist a passkey after its counter or backup state changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the passkey doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update_passkey(
        &self,
        credential_id: &[u8],
        passkey: &Passkey,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE user_passkeys SET passkey = $2, last_used_at = now() WHERE credential_id = $1",
        )
        .bind(credential_id)
        .bind(sqlx::types::Json(passkey_json(passkey)?))
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
