//! Authentication service.
//!
//! Sign-in is by emailed one-time code ([`otp`]) or `WebAuthn` passkey.
//! Either way the result is a `dash_session` cookie ([`session`]).

mod error;
pub mod otp;
pub mod session;

pub use error::AuthError;
pub use otp::OtpService;
pub use session::{SESSION_COOKIE, SESSION_TTL_DAYS, SessionService, SessionToken};

use sqlx::PgPool;
use webauthn_rs::prelude::*;

use dash_memories_core::{Email, UserId};

use crate::db::UserRepository;
use crate::models::{User, UserPasskey};

/// Passkey registration and authentication.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    webauthn: &'a Webauthn,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, webauthn: &'a Webauthn) -> Self {
        Self {
            users: UserRepository::new(pool),
            webauthn,
        }
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Get the account for an email, creating it on first sign-in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn get_or_create_user(&self, email: &Email) -> Result<User, AuthError> {
        Ok(self.users.get_or_create(email).await?)
    }

    /// Number of passkeys for the account with this id or email.
    ///
    /// Unknown accounts have zero.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn passkey_count(
        &self,
        user_id: Option<UserId>,
        email: Option<&Email>,
    ) -> Result<i64, AuthError> {
        let user = match (user_id, email) {
            (Some(id), _) => self.users.get_by_id(id).await?,
            (None, Some(email)) => self.users.get_by_email(email).await?,
            (None, None) => None,
        };
        match user {
            Some(user) => Ok(self.users.count_passkeys(user.id).await?),
            None => Ok(0),
        }
    }

    /// Start passkey registration for a signed-in user.
    ///
    /// Returns the challenge for the browser and the state to keep in the
    /// server-side session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WebAuthn` if the challenge cannot be generated.
    pub async fn start_passkey_registration(
        &self,
        user: &User,
    ) -> Result<(CreationChallengeResponse, PasskeyRegistration), AuthError> {
        let existing = self.users.get_passkeys(user.id).await?;
        let exclude_credentials: Vec<CredentialID> = existing
            .iter()
            .map(|c| CredentialID::from(c.webauthn_id.clone()))
            .collect();

        let (challenge, reg_state) = self.webauthn.start_passkey_registration(
            user.webauthn_user_id,
            user.email.as_str(),
            user.email.as_str(),
            Some(exclude_credentials),
        )?;

        Ok((challenge, reg_state))
    }

    /// Finish passkey registration and store the new passkey.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WebAuthn` if validation fails, or a repository
    /// error if the passkey cannot be stored.
    pub async fn finish_passkey_registration(
        &self,
        user_id: UserId,
        state: &PasskeyRegistration,
        response: &RegisterPublicKeyCredential,
        name: &str,
    ) -> Result<UserPasskey, AuthError> {
        let passkey = self.webauthn.finish_passkey_registration(response, state)?;
        Ok(self.users.create_passkey(user_id, &passkey, name).await?)
    }

    /// Start passkey authentication for the account with this email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    /// Returns `AuthError::NoCredentials` if the user has no registered passkeys.
    /// Returns `AuthError::WebAuthn` if the challenge cannot be generated.
    pub async fn start_passkey_authentication(
        &self,
        email: &Email,
    ) -> Result<(RequestChallengeResponse, PasskeyAuthentication, UserId), AuthError> {
        let user = self
            .users
            .get_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let passkeys: Vec<Passkey> = self
            .users
            .get_passkeys(user.id)
            .await?
            .into_iter()
            .map(|c| c.passkey)
            .collect();
        if passkeys.is_empty() {
            return Err(AuthError::NoCredentials);
        }

        let (challenge, auth_state) = self.webauthn.start_passkey_authentication(&passkeys)?;
        Ok((challenge, auth_state, user.id))
    }

    /// Finish passkey authentication.
    ///
    /// Validates the assertion, persists the updated counter when needed and
    /// returns the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WebAuthn` if validation fails.
    pub async fn finish_passkey_authentication(
        &self,
        state: &PasskeyAuthentication,
        response: &PublicKeyCredential,
        user_id: UserId,
    ) -> Result<User, AuthError> {
        let auth_result = self
            .webauthn
            .finish_passkey_authentication(response, state)?;

        if auth_result.needs_update() {
            let cred_id = auth_result.cred_id();
            if let Some(mut credential) = self
                .users
                .get_passkey_by_webauthn_id(cred_id.as_ref())
                .await?
            {
                credential.passkey.update_credential(&auth_result);
                self.users
                    .update_passkey(cred_id.as_ref(), &credential.passkey)
                    .await?;
            }
        }

        self.get_user(user_id).await
    }
}
