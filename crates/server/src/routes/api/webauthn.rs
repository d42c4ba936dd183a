//! `WebAuthn` API routes.
//!
//! JSON API endpoints for passkey registration and authentication.
//!
//! Registration needs a signed-in user (email code first). Authentication is
//! by email and ends in the same `dash_session` cookie as an email sign-in.
//! Ceremony state lives in the short-lived server-side session between the
//! start and finish calls.

use axum::{Json, Router, extract::State, routing::post};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;
use webauthn_rs::prelude::*;

use dash_memories_core::{Email, UserId};

use crate::error::{AppError, Result, set_sentry_user};
use crate::middleware::{RequireAuth, session_cookie};
use crate::models::session::keys;
use crate::services::auth::{AuthError, AuthService, SessionService};
use crate::state::AppState;

/// Build the `WebAuthn` API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/webauthn/register/start", post(start_registration))
        .route("/api/webauthn/register/finish", post(finish_registration))
        .route("/api/webauthn/authenticate/start", post(start_authentication))
        .route("/api/webauthn/authenticate/finish", post(finish_authentication))
        .route("/api/webauthn/status", post(status))
}

fn session_error(err: tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("session error: {err}"))
}

// ============================================================================
// Registration
// ============================================================================

/// Response from starting passkey registration.
#[derive(Debug, Serialize)]
pub struct StartRegistrationResponse {
    pub options: CreationChallengeResponse,
}

/// Start passkey registration for the signed-in user.
///
/// POST /api/webauthn/register/start
///
/// # Errors
///
/// Returns `AppError` if the challenge cannot be created or stored.
#[instrument(skip_all)]
pub async fn start_registration(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
) -> Result<Json<StartRegistrationResponse>> {
    let auth = AuthService::new(state.pool(), state.webauthn());
    let user = auth.get_user(current.id).await?;
    let (options, reg_state) = auth.start_passkey_registration(&user).await?;

    session
        .insert(keys::WEBAUTHN_REG, reg_state)
        .await
        .map_err(session_error)?;

    Ok(Json(StartRegistrationResponse { options }))
}

/// Request to finish passkey registration.
#[derive(Debug, Deserialize)]
pub struct FinishRegistrationRequest {
    /// The `WebAuthn` response from the authenticator.
    pub credential: RegisterPublicKeyCredential,
    /// User-assigned name for this passkey.
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishRegistrationResponse {
    pub success: bool,
    pub credential_id: i32,
}

/// Finish passkey registration.
///
/// POST /api/webauthn/register/finish
///
/// # Errors
///
/// Returns `AppError` if no ceremony is in progress or validation fails.
#[instrument(skip_all)]
pub async fn finish_registration(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Json(req): Json<FinishRegistrationRequest>,
) -> Result<Json<FinishRegistrationResponse>> {
    let reg_state: PasskeyRegistration = session
        .remove(keys::WEBAUTHN_REG)
        .await
        .map_err(session_error)?
        .ok_or(AuthError::InvalidSessionState)?;

    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("Passkey");

    let passkey = AuthService::new(state.pool(), state.webauthn())
        .finish_passkey_registration(current.id, &reg_state, &req.credential, name)
        .await?;
    tracing::info!(credential_id = %passkey.id, "Passkey registered");

    Ok(Json(FinishRegistrationResponse {
        success: true,
        credential_id: passkey.id.as_i32(),
    }))
}

// ============================================================================
// Authentication
// ============================================================================

/// Request to start passkey authentication.
#[derive(Debug, Deserialize)]
pub struct StartAuthenticationRequest {
    pub email: String,
}

/// Response from starting passkey authentication.
#[derive(Debug, Serialize)]
pub struct StartAuthenticationResponse {
    pub options: RequestChallengeResponse,
}

/// Start passkey authentication.
///
/// POST /api/webauthn/authenticate/start
///
/// # Errors
///
/// Returns `AppError` if the account has no passkeys.
#[instrument(skip_all)]
pub async fn start_authentication(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<StartAuthenticationRequest>,
) -> Result<Json<StartAuthenticationResponse>> {
    let email = Email::parse(&req.email).map_err(AuthError::from)?;
    let (options, auth_state, user_id) = AuthService::new(state.pool(), state.webauthn())
        .start_passkey_authentication(&email)
        .await?;

    session
        .insert(keys::WEBAUTHN_AUTH, (auth_state, user_id))
        .await
        .map_err(session_error)?;

    Ok(Json(StartAuthenticationResponse { options }))
}

/// Request to finish passkey authentication.
#[derive(Debug, Deserialize)]
pub struct FinishAuthenticationRequest {
    pub credential: PublicKeyCredential,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishAuthenticationResponse {
    pub success: bool,
    pub user_id: i32,
    pub email: String,
}

/// Finish passkey authentication and start a `dash_session`.
///
/// POST /api/webauthn/authenticate/finish
///
/// # Errors
///
/// Returns `AppError` if no ceremony is in progress or validation fails.
#[instrument(skip_all)]
pub async fn finish_authentication(
    State(state): State<AppState>,
    session: Session,
    jar: CookieJar,
    Json(req): Json<FinishAuthenticationRequest>,
) -> Result<(CookieJar, Json<FinishAuthenticationResponse>)> {
    let (auth_state, user_id): (PasskeyAuthentication, UserId) = session
        .remove(keys::WEBAUTHN_AUTH)
        .await
        .map_err(session_error)?
        .ok_or(AuthError::InvalidSessionState)?;

    let user = AuthService::new(state.pool(), state.webauthn())
        .finish_passkey_authentication(&auth_state, &req.credential, user_id)
        .await?;
    let token = SessionService::new(state.pool()).start(user.id).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    tracing::info!(user_id = %user.id, "Signed in with passkey");

    let jar = jar.add(session_cookie(
        token.token,
        token.expires_at,
        state.config().is_secure(),
    ));
    Ok((
        jar,
        Json(FinishAuthenticationResponse {
            success: true,
            user_id: user.id.as_i32(),
            email: user.email.into_inner(),
        }),
    ))
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub user_id: Option<i32>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub has_passkey: bool,
    pub count: i64,
}

/// Whether an account has passkeys.
///
/// POST /api/webauthn/status
///
/// # Errors
///
/// Returns `AppError` if neither identifier is given.
#[instrument(skip_all)]
pub async fn status(
    State(state): State<AppState>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<StatusResponse>> {
    let email = req
        .email
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .map(Email::parse)
        .transpose()
        .map_err(AuthError::from)?;
    if req.user_id.is_none() && email.is_none() {
        return Err(AppError::BadRequest("Missing userId or email.".to_string()));
    }

    let count = AuthService::new(state.pool(), state.webauthn())
        .passkey_count(req.user_id.map(UserId::new), email.as_ref())
        .await?;
    Ok(Json(StatusResponse {
        has_passkey: count > 0,
        count,
    }))
}
