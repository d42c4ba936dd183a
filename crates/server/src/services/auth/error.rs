//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] dash_memories_core::EmailError),

    /// The submitted code is not six digits. Reported like a wrong code.
    #[error("Invalid code.")]
    MalformedCode,

    /// Every candidate code has expired.
    #[error("Code expired.")]
    CodeExpired,

    /// No candidate code matched.
    #[error("Invalid code.")]
    InvalidCode,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// No `dash_session` cookie, or it no longer maps to a live session.
    #[error("not signed in")]
    NotAuthenticated,

    /// `WebAuthn` error.
    #[error("webauthn error: {0}")]
    WebAuthn(#[from] webauthn_rs::prelude::WebauthnError),

    /// No passkeys registered for user.
    #[error("no passkeys registered for this account")]
    NoCredentials,

    /// Ceremony state missing from the server-side session.
    #[error("invalid session state")]
    InvalidSessionState,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
