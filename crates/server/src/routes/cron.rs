//! Scheduled maintenance endpoints.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::services::cleanup::{self, CleanupReport};
use crate::state::AppState;

/// Whether the request carries `Authorization: Bearer {secret}`.
///
/// With no secret configured every caller is allowed.
#[must_use]
pub fn is_authorized(headers: &HeaderMap, secret: Option<&SecretString>) -> bool {
    let Some(secret) = secret else {
        return true;
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();

    // Compare digests so the check does not short-circuit on the secret.
    Sha256::digest(presented.as_bytes()) == Sha256::digest(secret.expose_secret().as_bytes())
}

/// POST /api/cron/cleanup
#[instrument(skip_all)]
pub async fn cleanup(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<CleanupReport>> {
    if !is_authorized(&headers, state.config().cron_secret.as_ref()) {
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    }

    let report = cleanup::run(
        state.pool(),
        state.storage(),
        &state.config().storage.temp_video_bucket,
        chrono::Utc::now(),
    )
    .await;
    Ok(Json(report))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_no_secret_allows_all() {
        assert!(is_authorized(&HeaderMap::new(), None));
    }

    #[test]
    fn test_bearer_must_match() {
        let secret = SecretString::from("cron-secret-value");
        assert!(is_authorized(&bearer("Bearer cron-secret-value"), Some(&secret)));
        assert!(!is_authorized(&bearer("Bearer nope"), Some(&secret)));
        assert!(!is_authorized(&bearer("cron-secret-value"), Some(&secret)));
        assert!(!is_authorized(&HeaderMap::new(), Some(&secret)));
    }
}
