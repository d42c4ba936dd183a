//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                         - Liveness
//! GET  /health/ready                   - Readiness (database ping)
//! GET  /h/{slug}                       - Tribute page
//!
//! # Drafts
//! POST /api/drafts                     - Create a draft under the next slug
//! GET  /api/drafts/latest              - Latest draft for ?userId= or ?email=
//! POST /api/drafts/save                - Upsert owner and memorial details
//! GET  /api/drafts/{slug}              - Draft JSON
//! POST /api/drafts/{slug}/qr           - Fix the QR target and store the QR URL
//!
//! # Uploads (rate limited)
//! POST /api/temp-upload-video          - Stage a video until checkout
//! POST /api/upload-photo               - Tribute photo + accent color
//! POST /api/generate-print-pdf         - Render one print format
//! POST /api/checkout                   - Memorial print order to the vendor
//! POST /api/generate-mockup            - Acrylic preview image
//!
//! # Video host
//! POST /api/mux/create-upload          - Browser direct-upload slot
//! GET  /api/mux/asset-status           - Asset status and playback id
//!
//! # QR
//! GET  /api/qr                         - QR PNG
//!
//! # Pricing
//! GET  /api/pricing                    - Packages, add-ons and ?tier=&addOns= total
//!
//! # Payments
//! POST /api/checkout/create-session    - Stripe Checkout Session
//! POST /api/checkout/verify            - Confirm payment with Stripe
//! POST /api/webhooks/stripe            - Stripe events
//!
//! # Maintenance
//! POST /api/cron/cleanup               - 24 h sweep (Bearer CRON_SECRET)
//!
//! # Stories
//! GET  /api/stories/{slug}             - Story + moments
//! POST /api/stories/{slug}/moments     - Add a moment (owner)
//!
//! # Auth (rate limited)
//! POST /api/auth/email-otp/send        - Email a sign-in code
//! POST /api/auth/email-otp/verify      - Verify it and start a session
//! GET  /api/auth/session               - Validate and rotate the session
//! POST /api/auth/logout                - End the session
//!
//! # `WebAuthn` API (rate limited, ceremony session)
//! POST /api/webauthn/register/start
//! POST /api/webauthn/register/finish
//! POST /api/webauthn/authenticate/start
//! POST /api/webauthn/authenticate/finish
//! POST /api/webauthn/status
//! ```

pub mod api;
pub mod auth;
pub mod checkout;
pub mod cron;
pub mod drafts;
pub mod health;
pub mod mux;
pub mod pricing;
pub mod print;
pub mod qr;
pub mod stories;
pub mod uploads;
pub mod webhooks;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use dash_memories_core::Slug;

use crate::error::{AppError, Result};
use crate::middleware::{auth_rate_limiter, create_session_layer, upload_rate_limiter};
use crate::state::AppState;

/// Parse a slug from a path or body, or 400.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for a malformed slug.
pub fn parse_slug(value: &str) -> Result<Slug> {
    Slug::parse(value.trim())
        .map_err(|_| AppError::BadRequest("Invalid memorial slug.".to_string()))
}

/// Create the draft routes router.
pub fn draft_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(drafts::create))
        .route("/latest", get(drafts::latest))
        .route("/save", post(drafts::save))
        .route("/{slug}", get(drafts::show))
        .route("/{slug}/qr", post(drafts::generate_qr))
}

/// Uploads and print renders: rate limited, large bodies allowed.
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/api/temp-upload-video", post(uploads::temp_upload_video))
        .route("/api/upload-photo", post(uploads::upload_photo))
        .route("/api/generate-print-pdf", post(print::generate_print_pdf))
        .route("/api/checkout", post(print::print_order))
        .route("/api/generate-mockup", post(print::generate_mockup))
        .layer(DefaultBodyLimit::max(uploads::UPLOAD_BODY_LIMIT))
        .layer(upload_rate_limiter())
}

/// Create the email sign-in routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/email-otp/send", post(auth::send_code))
        .route("/email-otp/verify", post(auth::verify_code))
        .layer(auth_rate_limiter())
        .route("/session", get(auth::session))
        .route("/logout", post(auth::logout))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/create-session", post(checkout::create_session))
        .route("/verify", post(checkout::verify))
}

/// Create the story routes router.
pub fn story_routes() -> Router<AppState> {
    Router::new()
        .route("/{slug}", get(stories::show))
        .route("/{slug}/moments", post(stories::add_moment))
}

/// Create all routes.
///
/// The passkey routes carry the ceremony session layer, which needs the
/// pool and config from `state`.
pub fn routes(state: &AppState) -> Router<AppState> {
    let webauthn = api::webauthn::router()
        .layer(create_session_layer(state.pool(), state.config()))
        .layer(auth_rate_limiter());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .route("/h/{slug}", get(stories::tribute_page))
        .nest("/api/drafts", draft_routes())
        .merge(upload_routes())
        .route("/api/mux/create-upload", post(mux::create_upload))
        .route("/api/mux/asset-status", get(mux::asset_status))
        .route("/api/qr", get(qr::render))
        .route("/api/pricing", get(pricing::show))
        .nest("/api/checkout", checkout_routes())
        .route("/api/webhooks/stripe", post(webhooks::stripe))
        .route("/api/cron/cleanup", post(cron::cleanup).get(cron::cleanup))
        .nest("/api/stories", story_routes())
        .nest("/api/auth", auth_routes())
        .merge(webauthn)
}
