//! Stripe webhook receiver.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde_json::{Value, json};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::services::fulfillment::{self, Fulfillment};
use crate::services::stripe::{CHECKOUT_SESSION_COMPLETED, Event};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /api/webhooks/stripe
///
/// Any error other than a bad signature or unknown draft answers 500 so
/// Stripe redelivers the event.
#[instrument(skip_all)]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("No signature".to_string()))?;

    state.stripe().verify_webhook(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Webhook signature rejected");
        AppError::BadRequest("Invalid signature".to_string())
    })?;

    let event: Event = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid event payload: {e}")))?;
    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Stripe event received");

    if event.event_type != CHECKOUT_SESSION_COMPLETED {
        return Ok(Json(json!({ "received": true })));
    }

    let session = event.checkout_session()?;
    match fulfillment::fulfill_checkout(&state, &session).await? {
        Fulfillment::AlreadyFulfilled { slug } => {
            Ok(Json(json!({ "received": true, "slug": slug, "alreadyFulfilled": true })))
        }
        Fulfillment::Completed {
            slug,
            video,
            print_url,
            vendor_notified,
            ..
        } => Ok(Json(json!({
            "received": true,
            "slug": slug,
            "playbackId": video.map(|v| v.playback_id),
            "printPdfUrl": print_url,
            "vendorNotified": vendor_notified,
        }))),
    }
}
