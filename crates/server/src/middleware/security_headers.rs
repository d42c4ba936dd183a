//! Security headers middleware.
//!
//! Locked down by default. The content policy opens only what the tribute
//! pages and editor need: Supabase Storage for photos and uploads, Mux for
//! playback and direct uploads, and Stripe Checkout.

use axum::{
    extract::{Request, State},
    http::{
        HeaderName, HeaderValue,
        header::{
            CACHE_CONTROL, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
            X_FRAME_OPTIONS,
        },
    },
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

/// Build the content security policy for a storage origin.
#[must_use]
pub fn content_security_policy(storage_origin: &str) -> String {
    format!(
        "default-src 'none'; \
         script-src 'self' https://js.stripe.com https://cdn.jsdelivr.net; \
         style-src 'self' 'unsafe-inline'; \
         font-src 'self'; \
         img-src 'self' data: {storage_origin} https://image.mux.com; \
         media-src 'self' blob: {storage_origin} https://stream.mux.com; \
         connect-src 'self' {storage_origin} https://*.mux.com https://*.litix.io https://storage.googleapis.com; \
         frame-src https://js.stripe.com https://checkout.stripe.com; \
         object-src 'none'; \
         base-uri 'self'; \
         form-action 'self' https://checkout.stripe.com; \
         frame-ancestors 'none'; \
         upgrade-insecure-requests"
    )
}

/// Add security headers to all responses.
///
/// `Cache-Control: no-store` is applied only when the handler did not set
/// its own caching (QR images are publicly cacheable).
pub async fn security_headers_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    let storage_origin = state.config().storage.url.trim_end_matches('/');
    match HeaderValue::from_str(&content_security_policy(storage_origin)) {
        Ok(csp) => {
            headers.insert(CONTENT_SECURITY_POLICY, csp);
        }
        Err(e) => tracing::warn!(error = %e, "Storage URL is not a valid CSP source"),
    }

    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static(
            "camera=(), \
             geolocation=(), \
             microphone=(), \
             payment=(self \"https://checkout.stripe.com\"), \
             publickey-credentials-create=(self), \
             publickey-credentials-get=(self), \
             usb=()",
        ),
    );

    if !headers.contains_key(CACHE_CONTROL) {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store, max-age=0"));
    }

    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin-allow-popups"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_includes_storage_origin() {
        let csp = content_security_policy("https://abc.supabase.co");
        assert!(csp.contains("img-src 'self' data: https://abc.supabase.co"));
        assert!(csp.contains("media-src 'self' blob: https://abc.supabase.co https://stream.mux.com"));
        assert!(csp.contains("frame-ancestors 'none'"));
        assert!(HeaderValue::from_str(&csp).is_ok());
    }
}
