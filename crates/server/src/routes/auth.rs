//! Email sign-in and the `dash_session` cookie.

use axum::{Json, extract::State};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use dash_memories_core::Email;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{expired_session_cookie, session_cookie};
use crate::services::auth::{
    AuthError, AuthService, OtpService, SESSION_COOKIE, SessionService, otp::CODE_TTL_MINUTES,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_code: Option<String>,
}

/// POST /api/auth/email-otp/send
#[instrument(skip(state, req))]
pub async fn send_code(
    State(state): State<AppState>,
    Json(req): Json<SendCodeRequest>,
) -> Result<Json<SendCodeResponse>> {
    let email = Email::parse(&req.email).map_err(AuthError::from)?;
    let otp = &state.config().otp;
    let issued = OtpService::new(state.pool(), otp).issue(&email).await?;

    if issued.is_test_account {
        tracing::info!(%email, "Test account, sign-in email skipped");
    } else {
        state
            .email()
            .send_otp_code(email.as_str(), &issued.code, CODE_TTL_MINUTES)
            .await?;
    }

    Ok(Json(SendCodeResponse {
        success: true,
        debug_code: otp.debug_code.then_some(issued.code),
    }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
    pub success: bool,
    pub user_id: i32,
    pub email: String,
}

/// POST /api/auth/email-otp/verify
#[instrument(skip(state, jar, req))]
pub async fn verify_code(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<VerifyCodeRequest>,
) -> Result<(CookieJar, Json<SignedIn>)> {
    let email = Email::parse(&req.email).map_err(AuthError::from)?;
    OtpService::new(state.pool(), &state.config().otp)
        .verify(&email, &req.code)
        .await?;

    let user = AuthService::new(state.pool(), state.webauthn())
        .get_or_create_user(&email)
        .await?;
    let token = SessionService::new(state.pool()).start(user.id).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    tracing::info!(user_id = %user.id, "Signed in with email code");

    let jar = jar.add(session_cookie(
        token.token,
        token.expires_at,
        state.config().is_secure(),
    ));
    Ok((
        jar,
        Json(SignedIn {
            success: true,
            user_id: user.id.as_i32(),
            email: user.email.into_inner(),
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl SessionStatus {
    const fn anonymous() -> Self {
        Self {
            authenticated: false,
            user_id: None,
            email: None,
        }
    }
}

/// GET /api/auth/session
///
/// Validates the cookie, rotates the token and extends its expiry.
#[instrument(skip_all)]
pub async fn session(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionStatus>)> {
    let secure = state.config().is_secure();
    let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        return Ok((jar, Json(SessionStatus::anonymous())));
    };

    match SessionService::new(state.pool()).refresh(&token).await {
        Ok((user, rotated)) => {
            let jar = jar.add(session_cookie(rotated.token, rotated.expires_at, secure));
            Ok((
                jar,
                Json(SessionStatus {
                    authenticated: true,
                    user_id: Some(user.id.as_i32()),
                    email: Some(user.email.into_inner()),
                }),
            ))
        }
        Err(AuthError::NotAuthenticated) => Ok((
            jar.add(expired_session_cookie(secure)),
            Json(SessionStatus::anonymous()),
        )),
        Err(e) => Err(e.into()),
    }
}

/// POST /api/auth/logout
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<serde_json::Value>)> {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        SessionService::new(state.pool())
            .end(&token)
            .await
            .map_err(AppError::from)?;
    }
    clear_sentry_user();

    Ok((
        jar.add(expired_session_cookie(state.config().is_secure())),
        Json(serde_json::json!({ "success": true })),
    ))
}
