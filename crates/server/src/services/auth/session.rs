//! `dash_session` cookie sessions.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use dash_memories_core::UserId;

use super::AuthError;
use crate::db::SessionRepository;
use crate::models::CurrentUser;

/// Cookie carrying the raw session token.
pub const SESSION_COOKIE: &str = "dash_session";

/// Session lifetime, also used as the cookie max-age.
pub const SESSION_TTL_DAYS: i64 = 180;

/// A raw token handed to the browser with its expiry.
#[derive(Debug)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// 32 random bytes, hex-encoded.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 of the token, hex-encoded. Only this is stored.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn new_expiry() -> DateTime<Utc> {
    Utc::now() + Duration::days(SESSION_TTL_DAYS)
}

/// Creates, validates and rotates sessions.
pub struct SessionService<'a> {
    sessions: SessionRepository<'a>,
}

impl<'a> SessionService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            sessions: SessionRepository::new(pool),
        }
    }

    /// Start a session for a user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the session cannot be stored.
    pub async fn start(&self, user_id: UserId) -> Result<SessionToken, AuthError> {
        let token = generate_token();
        let expires_at = new_expiry();
        self.sessions
            .create(user_id, &hash_token(&token), expires_at)
            .await?;
        Ok(SessionToken { token, expires_at })
    }

    /// Resolve a token to its user without rotating.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotAuthenticated` for unknown or expired tokens.
    pub async fn resolve(&self, token: &str) -> Result<CurrentUser, AuthError> {
        let stored = self
            .sessions
            .find_by_hash(&hash_token(token))
            .await?
            .ok_or(AuthError::NotAuthenticated)?;
        if stored.expires_at <= Utc::now() {
            return Err(AuthError::NotAuthenticated);
        }
        Ok(stored.user)
    }

    /// Validate a token, sweep expired sessions, then rotate the token and
    /// extend its expiry.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotAuthenticated` for unknown or expired tokens.
    pub async fn refresh(&self, token: &str) -> Result<(CurrentUser, SessionToken), AuthError> {
        let removed = self.sessions.delete_expired().await?;
        if removed > 0 {
            tracing::debug!(removed, "Removed expired sessions");
        }

        let stored = self
            .sessions
            .find_by_hash(&hash_token(token))
            .await?
            .ok_or(AuthError::NotAuthenticated)?;
        if stored.expires_at <= Utc::now() {
            return Err(AuthError::NotAuthenticated);
        }

        let token = generate_token();
        let expires_at = new_expiry();
        self.sessions
            .rotate(stored.id, &hash_token(&token), expires_at)
            .await?;
        Ok((stored.user, SessionToken { token, expires_at }))
    }

    /// End the session for this token, if any.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the delete fails.
    pub async fn end(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.delete_by_hash(&hash_token(token)).await?;
        Ok(())
    }
}
