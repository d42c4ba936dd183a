//! Print artifacts: single-format PDFs, the memorial print order and the
//! acrylic preview image.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderName, HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use dash_memories_core::{PrintFormat, Slug};

use super::parse_slug;
use crate::db::{DraftRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::services::email::{PdfAttachment, VendorMailer, VendorOrder};
use crate::services::mockup::{self, MockupContent};
use crate::services::pdf::PrintContent;
use crate::services::prints;
use crate::services::qr::{WHITE, parse_color};
use crate::services::storage::ObjectStorage;
use crate::state::AppState;

const PRINT_URL_HEADER: &str = "x-print-url";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePrintRequest {
    pub slug: Option<String>,
    pub photo_url: Option<String>,
    #[serde(default)]
    pub format: PrintFormat,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub birth_date: String,
    #[serde(default)]
    pub death_date: String,
    pub counselor_name: Option<String>,
    pub counselor_phone: Option<String>,
    #[serde(default)]
    pub passage_index: usize,
}

fn require_slug(slug: Option<&str>) -> Result<Slug> {
    let slug = slug
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing memorial slug.".to_string()))?;
    parse_slug(slug)
}

/// Where the printed QR code leads: the stored target, else the tribute page.
async fn qr_target(state: &AppState, slug: &Slug) -> Result<(String, Option<String>)> {
    let draft = DraftRepository::new(state.pool()).get_by_slug(slug).await?;
    let photo = draft.as_ref().and_then(|d| d.photo_url.clone());
    let target = draft
        .and_then(|d| d.qr_target)
        .unwrap_or_else(|| state.config().absolute_url(&format!("/h/{slug}")));
    Ok((target, photo))
}

async fn load_photo(state: &AppState, url: Option<&str>) -> Result<Option<Vec<u8>>> {
    match url {
        Some(url) => Ok(Some(prints::fetch_photo(state.http(), url).await.map_err(|e| {
            tracing::warn!(error = %e, "Photo fetch failed");
            AppError::BadRequest("Failed to fetch photo.".to_string())
        })?)),
        None => Ok(None),
    }
}

/// POST /api/generate-print-pdf
///
/// Returns the PDF inline and stores a copy; the stored URL is sent in
/// `X-Print-Url`.
#[instrument(skip(state, req), fields(format = %req.format))]
pub async fn generate_print_pdf(
    State(state): State<AppState>,
    Json(req): Json<GeneratePrintRequest>,
) -> Result<Response> {
    let slug = require_slug(req.slug.as_deref())?;
    let (target, draft_photo) = qr_target(&state, &slug).await?;

    let photo_url = req.photo_url.filter(|u| !u.trim().is_empty()).or(draft_photo);
    let needs_photo = matches!(
        req.format,
        PrintFormat::CardFront | PrintFormat::Poster | PrintFormat::Acrylic
    );
    if needs_photo && photo_url.is_none() {
        return Err(AppError::BadRequest("Missing photoUrl.".to_string()));
    }
    let photo = if needs_photo {
        load_photo(&state, photo_url.as_deref()).await?
    } else {
        None
    };

    let content = PrintContent {
        photo,
        background: None,
        qr_target: target,
        full_name: req.full_name,
        birth_date: req.birth_date,
        death_date: req.death_date,
        counselor_name: req.counselor_name,
        counselor_phone: req.counselor_phone,
        passage_index: req.passage_index,
    };
    let pdf = prints::render(req.format, Arc::new(content)).await?;

    let bucket = &state.config().storage.print_bucket;
    let print_url = prints::store(state.storage(), bucket, slug.as_str(), req.format, pdf.clone()).await?;
    if matches!(req.format, PrintFormat::CardFront | PrintFormat::CardBack) {
        // Prints can be previewed before a draft row exists.
        match DraftRepository::new(state.pool())
            .set_print_pdf_url(&slug, &print_url)
            .await
        {
            Ok(_) | Err(RepositoryError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }
    tracing::info!(%slug, %print_url, "Print PDF generated");

    let disposition = format!(
        "inline; filename=\"{}\"",
        req.format.attachment_name(slug.as_str())
    );
    let mut response = (
        [(header::CONTENT_TYPE, "application/pdf")],
        pdf,
    )
        .into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&print_url) {
        headers.insert(HeaderName::from_static(PRINT_URL_HEADER), value);
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockupRequest {
    pub slug: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockupResponse {
    pub mockup_url: String,
}

/// POST /api/generate-mockup
///
/// Renders the acrylic preview from the draft's photo (or `photoUrl`), QR
/// target and accent color, stores it and records `mockup_url`.
#[instrument(skip(state, req))]
pub async fn generate_mockup(
    State(state): State<AppState>,
    Json(req): Json<MockupRequest>,
) -> Result<Json<MockupResponse>> {
    let slug = require_slug(req.slug.as_deref())?;
    let drafts = DraftRepository::new(state.pool());
    let draft = drafts
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Draft not found".to_string()))?;

    let photo_url = req
        .photo_url
        .filter(|u| !u.trim().is_empty())
        .or_else(|| draft.photo_url.clone())
        .ok_or_else(|| AppError::BadRequest("Missing photoUrl.".to_string()))?;
    let photo = load_photo(&state, Some(&photo_url)).await?;

    let content = MockupContent {
        photo,
        qr_target: draft
            .qr_target
            .clone()
            .unwrap_or_else(|| state.config().absolute_url(&format!("/h/{slug}"))),
        accent: draft
            .accent_color
            .as_deref()
            .and_then(|c| parse_color(c).ok())
            .unwrap_or(WHITE),
    };
    let png = tokio::task::spawn_blocking(move || mockup::render(&content))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    let bucket = &state.config().storage.mockup_bucket;
    let path = mockup::object_path(slug.as_str());
    state.storage().upload(bucket, &path, png, "image/png").await?;
    let mockup_url = state.storage().public_url(bucket, &path);
    drafts.set_mockup_url(&slug, &mockup_url).await?;
    tracing::info!(%slug, %mockup_url, "Mockup stored");

    Ok(Json(MockupResponse { mockup_url }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintOrderRequest {
    #[serde(alias = "memorial_id")]
    pub slug: Option<String>,
    #[serde(alias = "photo")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub birth: String,
    #[serde(default)]
    pub death: String,
    pub lang: Option<String>,
    pub email: Option<String>,
    pub counselor_name: Option<String>,
    pub counselor_phone: Option<String>,
    #[serde(default)]
    pub passage_index: usize,
}

impl PrintOrderRequest {
    /// Confirmation page URL for this order.
    #[must_use]
    pub fn success_url(&self) -> String {
        let lang = self.lang.as_deref().unwrap_or("en");
        let params: Vec<String> = [
            ("name", self.name.as_str()),
            ("birth", self.birth.as_str()),
            ("death", self.death.as_str()),
            ("slug", self.slug.as_deref().unwrap_or_default()),
            ("lang", lang),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect();

        if params.is_empty() {
            "/memorial/order/success".to_string()
        } else {
            format!("/memorial/order/success?{}", params.join("&"))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PrintOrderResponse {
    pub url: String,
}

/// POST /api/checkout
///
/// Renders the card front, card back and poster concurrently and emails
/// whichever succeeded to the print vendor.
#[instrument(skip(state, req))]
pub async fn print_order(
    State(state): State<AppState>,
    Json(req): Json<PrintOrderRequest>,
) -> Result<Json<PrintOrderResponse>> {
    let url = req.success_url();
    let slug = require_slug(req.slug.as_deref())?;
    let (target, draft_photo) = qr_target(&state, &slug).await?;
    let photo_url = req
        .photo_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .or(draft_photo);

    let photo = match photo_url.as_deref() {
        Some(url) => prints::fetch_photo(state.http(), url)
            .await
            .inspect_err(|e| tracing::warn!(%slug, error = %e, "Photo fetch failed"))
            .ok(),
        None => None,
    };

    let content = PrintContent {
        photo,
        background: None,
        qr_target: target,
        full_name: req.name.clone(),
        birth_date: req.birth.clone(),
        death_date: req.death.clone(),
        counselor_name: req.counselor_name.clone(),
        counselor_phone: req.counselor_phone.clone(),
        passage_index: req.passage_index,
    };

    let mut attachments = Vec::new();
    for (format, result) in prints::render_order(content).await {
        match result {
            Ok(bytes) => attachments.push(PdfAttachment {
                filename: format.attachment_name(slug.as_str()),
                bytes,
            }),
            Err(e) => tracing::warn!(%slug, %format, error = %e, "Print render failed"),
        }
    }

    match state.email().vendor_recipient() {
        Some((_, is_test)) if !attachments.is_empty() => {
            let order = VendorOrder {
                slug: slug.as_str(),
                customer_email: req.email.as_deref(),
                subject_prefix: if is_test { "Test Print PDF" } else { "New Print Order" },
                attachments,
            };
            state.email().send_vendor_order(order).await?;
        }
        Some(_) => tracing::warn!(%slug, "No print rendered, vendor email skipped"),
        None => tracing::warn!(%slug, "No vendor inbox configured, order not emailed"),
    }

    Ok(Json(PrintOrderResponse { url }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order(body: serde_json::Value) -> PrintOrderRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_success_url() {
        let req = order(serde_json::json!({
            "slug": "000042",
            "name": "Ada Lovelace",
            "birth": "1815-12-10",
            "death": "1852-11-27",
        }));
        assert_eq!(
            req.success_url(),
            "/memorial/order/success?name=Ada%20Lovelace&birth=1815-12-10&death=1852-11-27&slug=000042&lang=en"
        );
    }

    #[test]
    fn test_order_aliases() {
        let req = order(serde_json::json!({ "memorial_id": "000007", "photo": "https://x/p.jpg" }));
        assert_eq!(req.slug.as_deref(), Some("000007"));
        assert_eq!(req.photo_url.as_deref(), Some("https://x/p.jpg"));
    }

    #[test]
    fn test_generate_request_defaults_to_card_front() {
        let req: GeneratePrintRequest =
            serde_json::from_value(serde_json::json!({ "slug": "000001" })).unwrap();
        assert_eq!(req.format, PrintFormat::CardFront);
        assert_eq!(req.passage_index, 0);
    }

    #[test]
    fn test_missing_slug() {
        let err = require_slug(Some("  ")).unwrap_err();
        assert_eq!(err.public_message(), "Missing memorial slug.");
    }
}
