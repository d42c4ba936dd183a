//! Server-side session for passkey ceremonies.
//!
//! `WebAuthn` registration and authentication state lives between the start
//! and finish calls in a short-lived `PostgreSQL`-backed tower-sessions
//! session. Sign-in itself uses the separate `dash_session` cookie.

use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::DashConfig;

/// Ceremony session cookie name.
pub const CEREMONY_COOKIE_NAME: &str = "dash_ceremony";

/// Ceremony state expires after 10 minutes of inactivity.
const CEREMONY_EXPIRY_SECONDS: i64 = 10 * 60;

/// Create the ceremony session layer.
#[must_use]
pub fn create_session_layer(pool: &PgPool, config: &DashConfig) -> SessionManagerLayer<PostgresStore> {
    // The tower_sessions.session table is created by migration.
    let store = PostgresStore::new(pool.clone());

    SessionManagerLayer::new(store)
        .with_name(CEREMONY_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(CEREMONY_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/api/webauthn")
}
