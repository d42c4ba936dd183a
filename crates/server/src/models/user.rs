//! User domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use webauthn_rs::prelude::Passkey;

use dash_memories_core::{CredentialId, Email, UserId};

/// An account, identified by email.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Stable handle presented to authenticators.
    pub webauthn_user_id: Uuid,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

/// A `WebAuthn` passkey (domain type).
///
/// Users can have multiple passkeys for different devices.
#[derive(Debug, Clone)]
pub struct UserPasskey {
    /// Database ID of this credential.
    pub id: CredentialId,
    /// User who owns this credential.
    pub user_id: UserId,
    /// `WebAuthn` credential ID (from the authenticator).
    pub webauthn_id: Vec<u8>,
    /// The full passkey data including public key.
    pub passkey: Passkey,
    /// User-assigned name for this credential (e.g., "`MacBook`", "`iPhone`").
    pub name: String,
    /// When this credential was registered.
    pub created_at: DateTime<Utc>,
}
