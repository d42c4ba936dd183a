//! Authentication extractors.
//!
//! The signed-in user comes from the `dash_session` cookie. Only the token's
//! hash is stored server-side; see [`crate::services::auth::session`].

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::CurrentUser;
use crate::services::auth::{AuthError, SESSION_COOKIE, SessionService};
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Rejection for [`RequireAuth`].
pub struct AuthRejection(AppError);

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

async fn current_user(parts: &mut Parts, state: &AppState) -> Result<Option<CurrentUser>, AppError> {
    let jar = CookieJar::from_headers(&parts.headers);
    let Some(token) = jar.get(SESSION_COOKIE).map(Cookie::value) else {
        return Ok(None);
    };
    match SessionService::new(state.pool()).resolve(token).await {
        Ok(user) => Ok(Some(user)),
        Err(AuthError::NotAuthenticated) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        current_user(parts, state)
            .await
            .map_err(AuthRejection)?
            .map(Self)
            .ok_or_else(|| AuthRejection(AppError::Unauthorized("Sign in required.".into())))
    }
}

/// Extractor that optionally gets the signed-in user.
///
/// Lookup failures are logged and treated as signed out.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match current_user(parts, state).await {
            Ok(user) => Ok(Self(user)),
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed");
                Ok(Self(None))
            }
        }
    }
}

/// Build the `dash_session` cookie for a token.
#[must_use]
pub fn session_cookie(token: String, expires_at: DateTime<Utc>, secure: bool) -> Cookie<'static> {
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(max_age))
        .build()
}

/// A cookie that removes `dash_session`.
#[must_use]
pub fn expired_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let expires = Utc::now() + chrono::Duration::days(180);
        let cookie = session_cookie("abc".into(), expires, true);
        assert_eq!(cookie.name(), "dash_session");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        let max_age = cookie.max_age().map(time::Duration::whole_days);
        assert!(matches!(max_age, Some(179 | 180)));
    }

    #[test]
    fn test_expired_cookie_clears() {
        let cookie = expired_session_cookie(false);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
        assert_eq!(cookie.secure(), Some(false));
    }
}
