//! Session-related types.

use serde::{Deserialize, Serialize};

use dash_memories_core::{Email, UserId};

/// The signed-in user, resolved from the `dash_session` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
}

/// Keys for passkey ceremony state in the server-side session.
pub mod keys {
    /// Key for `WebAuthn` registration challenge state.
    pub const WEBAUTHN_REG: &str = "webauthn_reg";

    /// Key for `WebAuthn` authentication challenge state.
    pub const WEBAUTHN_AUTH: &str = "webauthn_auth";
}
