//! Draft API.
//!
//! Drafts are addressed by slug. Creating one allocates the next sequential
//! slug; saving upserts owner and memorial details without touching status.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use dash_memories_core::{Email, UserId};

use super::parse_slug;
use crate::db::{DraftOwner, DraftRepository, SaveDraft};
use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::models::Draft;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CreatedDraft {
    pub slug: String,
    pub url: String,
}

/// POST /api/drafts
#[instrument(skip(state, user))]
pub async fn create(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
) -> Result<(StatusCode, Json<CreatedDraft>)> {
    let draft = DraftRepository::new(state.pool())
        .create(user.as_ref().map(|u| u.id), user.as_ref().map(|u| &u.email))
        .await?;
    tracing::info!(slug = %draft.slug, "Draft created");

    Ok((
        StatusCode::CREATED,
        Json(CreatedDraft {
            url: draft.editor_path(),
            slug: draft.slug.into_inner(),
        }),
    ))
}

/// GET /api/drafts/{slug}
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<Draft>> {
    let slug = parse_slug(&slug)?;
    DraftRepository::new(state.pool())
        .get_by_slug(&slug)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Draft not found".to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub user_id: Option<i32>,
    pub email: Option<String>,
    pub slug: Option<String>,
    pub full_name: Option<String>,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub photo_url: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl SaveRequest {
    /// Validate into a repository upsert.
    ///
    /// # Errors
    ///
    /// `BadRequest` for missing account info, a missing slug, or an invalid
    /// email or slug.
    pub fn into_save(self) -> Result<SaveDraft> {
        let email = non_empty(self.email);
        if self.user_id.is_none() && email.is_none() {
            return Err(AppError::BadRequest("Missing account info.".to_string()));
        }
        let slug = non_empty(self.slug)
            .ok_or_else(|| AppError::BadRequest("Missing memorial slug.".to_string()))?;

        Ok(SaveDraft {
            slug: parse_slug(&slug)?,
            user_id: self.user_id.map(UserId::new),
            email: email
                .map(|e| Email::parse(&e))
                .transpose()
                .map_err(|_| AppError::BadRequest("Invalid email address".to_string()))?,
            full_name: non_empty(self.full_name),
            birth_date: non_empty(self.birth_date),
            death_date: non_empty(self.death_date),
            photo_url: non_empty(self.photo_url),
        })
    }
}

/// POST /api/drafts/save
#[instrument(skip(state, req))]
pub async fn save(State(state): State<AppState>, Json(req): Json<SaveRequest>) -> Result<Json<Value>> {
    let save = req.into_save()?;
    DraftRepository::new(state.pool()).save(&save).await?;
    tracing::info!(slug = %save.slug, "Draft saved");
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestQuery {
    pub user_id: Option<i32>,
    pub email: Option<String>,
}

impl LatestQuery {
    /// The owner to search by; user id wins over email.
    ///
    /// # Errors
    ///
    /// `BadRequest` when neither is given or the email is invalid.
    pub fn owner(self) -> Result<DraftOwner> {
        if let Some(id) = self.user_id {
            return Ok(DraftOwner::User(UserId::new(id)));
        }
        let email = non_empty(self.email)
            .ok_or_else(|| AppError::BadRequest("Missing userId or email.".to_string()))?;
        Email::parse(&email)
            .map(DraftOwner::Email)
            .map_err(|_| AppError::BadRequest("Invalid email address".to_string()))
    }
}

/// GET /api/drafts/latest?userId=|email=
#[instrument(skip(state))]
pub async fn latest(State(state): State<AppState>, Query(query): Query<LatestQuery>) -> Result<Json<Value>> {
    let owner = query.owner()?;
    let draft = DraftRepository::new(state.pool())
        .latest_for_owner(&owner)
        .await?;
    Ok(Json(json!({ "success": true, "draft": draft })))
}

#[derive(Debug, Default, Deserialize)]
pub struct QrRequest {
    pub target: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrResponse {
    pub qr_url: String,
    pub target: String,
}

/// POST /api/drafts/{slug}/qr
///
/// The first target stored wins; later calls report the stored one.
#[instrument(skip(state, req))]
pub async fn generate_qr(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    req: Option<Json<QrRequest>>,
) -> Result<Json<QrResponse>> {
    let slug = parse_slug(&slug)?;
    let requested = match req.and_then(|Json(r)| non_empty(r.target)) {
        Some(target) => {
            let parsed = url::Url::parse(&target)
                .map_err(|_| AppError::BadRequest("Invalid QR target.".to_string()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::BadRequest("Invalid QR target.".to_string()));
            }
            target
        }
        None => state.config().absolute_url(&format!("/h/{slug}")),
    };

    let drafts = DraftRepository::new(state.pool());
    let draft = drafts.set_qr_target(&slug, &requested).await?;
    let target = draft.qr_target.unwrap_or(requested);

    let qr_url = state.config().absolute_url(&format!(
        "/api/qr?data={}&size=480",
        urlencoding::encode(&target)
    ));
    drafts.set_qr_url(&slug, &qr_url).await?;
    tracing::info!(%slug, %target, "QR stored");

    Ok(Json(QrResponse { qr_url, target }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(user_id: Option<i32>, email: Option<&str>, slug: Option<&str>) -> SaveRequest {
        SaveRequest {
            user_id,
            email: email.map(String::from),
            slug: slug.map(String::from),
            full_name: Some("  Ada Lovelace ".into()),
            birth_date: Some(String::new()),
            death_date: None,
            photo_url: None,
        }
    }

    fn message(err: AppError) -> String {
        err.public_message()
    }

    #[test]
    fn test_save_requires_account() {
        let err = request(None, Some("   "), Some("000001")).into_save().unwrap_err();
        assert_eq!(message(err), "Missing account info.");
    }

    #[test]
    fn test_save_requires_slug() {
        let err = request(Some(1), None, None).into_save().unwrap_err();
        assert_eq!(message(err), "Missing memorial slug.");
    }

    #[test]
    fn test_save_normalizes_fields() {
        let save = request(None, Some("Family@Example.com"), Some("000001"))
            .into_save()
            .unwrap();
        assert_eq!(save.slug.as_str(), "000001");
        assert_eq!(save.email.unwrap().as_str(), "family@example.com");
        assert_eq!(save.full_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(save.birth_date, None);
    }

    #[test]
    fn test_latest_owner() {
        let owner = LatestQuery {
            user_id: Some(7),
            email: Some("a@b.co".into()),
        }
        .owner()
        .unwrap();
        assert!(matches!(owner, DraftOwner::User(id) if id == UserId::new(7)));

        let owner = LatestQuery {
            user_id: None,
            email: Some("a@b.co".into()),
        }
        .owner()
        .unwrap();
        assert!(matches!(owner, DraftOwner::Email(_)));

        assert!(
            LatestQuery {
                user_id: None,
                email: None
            }
            .owner()
            .is_err()
        );
    }
}
