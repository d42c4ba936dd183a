//! Stripe Checkout for the acrylic keepsake.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::parse_slug;
use crate::db::DraftRepository;
use crate::error::{AppError, Result};
use crate::services::stripe::NewCheckoutSession;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SlugRequest {
    pub slug: Option<String>,
}

impl SlugRequest {
    fn slug(&self) -> Result<dash_memories_core::Slug> {
        let slug = self
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing slug.".to_string()))?;
        parse_slug(slug)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub url: Option<String>,
}

/// POST /api/checkout/create-session
#[instrument(skip(state, req))]
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<SlugRequest>,
) -> Result<Json<CreateSessionResponse>> {
    let slug = req.slug()?;
    let price_id = state
        .config()
        .stripe
        .acrylic_price_id
        .as_deref()
        .ok_or_else(|| AppError::Internal("STRIPE_PRICE_ID_ACRYLIC is not set".to_string()))?;

    let drafts = DraftRepository::new(state.pool());
    let draft = drafts
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Draft not found".to_string()))?;

    let encoded = urlencoding::encode(slug.as_str());
    let success_url = state
        .config()
        .absolute_url(&format!("/checkout/success?slug={encoded}"));
    let cancel_url = state.config().absolute_url(&format!("/gift?slug={encoded}"));

    let session = state
        .stripe()
        .create_checkout_session(&NewCheckoutSession {
            price_id,
            slug: slug.as_str(),
            success_url: &success_url,
            cancel_url: &cancel_url,
            customer_email: draft.email.as_ref().map(|e| e.as_str()),
        })
        .await?;

    drafts.set_checkout_session(&slug, &session.id).await?;
    tracing::info!(%slug, session_id = %session.id, "Checkout session created");

    Ok(Json(CreateSessionResponse {
        session_id: session.id,
        url: session.url,
    }))
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub paid: bool,
}

/// POST /api/checkout/verify
///
/// Marks the draft paid only when Stripe reports the recorded session paid.
/// Fulfillment still runs from the webhook, which keys on the published
/// story rather than on status.
#[instrument(skip(state, req))]
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<SlugRequest>,
) -> Result<Json<VerifyResponse>> {
    let slug = req.slug()?;
    let drafts = DraftRepository::new(state.pool());
    let draft = drafts
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Draft not found".to_string()))?;

    if draft.status.is_paid() {
        return Ok(Json(VerifyResponse {
            success: true,
            paid: true,
        }));
    }

    let session_id = draft
        .checkout_session_id
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("No checkout session for this memorial.".to_string()))?;
    let session = state.stripe().retrieve_checkout_session(session_id).await?;

    let paid = session.is_paid();
    if paid {
        drafts.mark_paid(&slug).await?;
        tracing::info!(%slug, "Checkout verified, draft marked paid");
    } else {
        tracing::info!(%slug, status = ?session.payment_status, "Checkout not paid yet");
    }

    Ok(Json(VerifyResponse {
        success: true,
        paid,
    }))
}
