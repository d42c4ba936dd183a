//! Browser direct-upload endpoints backed by Mux.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::services::mux::VideoHost;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateUploadRequest {
    /// Tribute slug, echoed back by Mux as the asset passthrough.
    pub slug: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadResponse {
    pub upload_id: String,
    pub url: String,
}

/// POST /api/mux/create-upload
#[instrument(skip(state, req))]
pub async fn create_upload(
    State(state): State<AppState>,
    req: Option<Json<CreateUploadRequest>>,
) -> Result<Json<CreateUploadResponse>> {
    let slug = req.and_then(|Json(r)| r.slug);
    let upload = state.mux().create_upload(slug.as_deref()).await?;
    tracing::info!(upload_id = %upload.id, "Mux upload slot created");

    Ok(Json(CreateUploadResponse {
        upload_id: upload.id,
        url: upload.url,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStatusQuery {
    pub asset_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStatusResponse {
    pub status: Option<String>,
    pub playback_id: Option<String>,
}

/// GET /api/mux/asset-status?assetId=
#[instrument(skip(state))]
pub async fn asset_status(
    State(state): State<AppState>,
    Query(query): Query<AssetStatusQuery>,
) -> Result<Json<AssetStatusResponse>> {
    let asset_id = query
        .asset_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing assetId.".to_string()))?;

    let asset = state.mux().get_asset(&asset_id).await?;
    Ok(Json(AssetStatusResponse {
        playback_id: asset.playback_id().map(String::from),
        status: asset.status,
    }))
}
