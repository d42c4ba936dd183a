//! Multipart uploads: staged tribute videos and the tribute photo.

use axum::{
    Json,
    extract::{Multipart, State, multipart::Field},
};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use dash_memories_core::Slug;

use super::parse_slug;
use crate::db::DraftRepository;
use crate::error::{AppError, Result};
use crate::services::color::accent_color_or_default;
use crate::services::storage::ObjectStorage;
use crate::state::AppState;

/// Largest accepted video.
pub const MAX_VIDEO_BYTES: usize = 40 * 1024 * 1024;

/// Largest accepted photo.
pub const MAX_PHOTO_BYTES: usize = 15 * 1024 * 1024;

/// Request body limit for the upload routes; leaves room for multipart framing.
pub const UPLOAD_BODY_LIMIT: usize = MAX_VIDEO_BYTES + 1024 * 1024;

/// A file part read from a multipart form.
#[derive(Debug)]
pub struct UploadedFile {
    pub content_type: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// The `{file, slug}` form both upload routes accept.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub slug: Option<String>,
    pub file: Option<UploadedFile>,
}

impl UploadForm {
    /// Read the form, rejecting a file part larger than `max_bytes`.
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` past the limit, `BadRequest` for a malformed body.
    pub async fn read(mut multipart: Multipart, max_bytes: usize) -> Result<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            match field.name() {
                Some("slug") => {
                    form.slug = Some(field.text().await.map_err(bad_multipart)?);
                }
                Some("file") => {
                    form.file = Some(read_file(field, max_bytes).await?);
                }
                _ => {}
            }
        }
        Ok(form)
    }

    /// Both parts, or 400.
    ///
    /// # Errors
    ///
    /// `BadRequest` when the slug or file is missing or the slug is invalid.
    pub fn require(self) -> Result<(Slug, UploadedFile)> {
        let slug = self
            .slug
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing slug.".to_string()))?;
        let file = self
            .file
            .filter(|f| !f.bytes.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing file.".to_string()))?;
        Ok((parse_slug(&slug)?, file))
    }
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("File too large.".to_string())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

async fn read_file(mut field: Field<'_>, max_bytes: usize) -> Result<UploadedFile> {
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_ascii_lowercase();
    let file_name = field.file_name().map(String::from);

    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(bad_multipart)? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(AppError::PayloadTooLarge("File too large.".to_string()));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(UploadedFile {
        content_type,
        file_name,
        bytes,
    })
}

/// File extension for an accepted video type.
#[must_use]
pub fn video_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        "video/webm" => Some("webm"),
        _ => None,
    }
}

/// File extension for an accepted photo type. HEIC is not converted.
#[must_use]
pub fn photo_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TempVideoResponse {
    pub temp_url: String,
    /// Object path in the temp bucket, `{slug}/{uuid}.{ext}`.
    pub file_id: String,
}

/// Fresh object path for a staged video.
#[must_use]
pub fn temp_video_path(slug: &Slug, ext: &str) -> String {
    format!("{slug}/{}.{ext}", Uuid::new_v4())
}

/// POST /api/temp-upload-video
///
/// Stages the video until checkout; the webhook moves it to Mux.
#[instrument(skip(state, multipart))]
pub async fn temp_upload_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TempVideoResponse>> {
    let (slug, file) = UploadForm::read(multipart, MAX_VIDEO_BYTES).await?.require()?;
    let ext = video_extension(&file.content_type).ok_or_else(|| {
        AppError::UnsupportedMediaType("Only MP4, MOV or WebM videos are supported.".to_string())
    })?;

    let drafts = DraftRepository::new(state.pool());
    if drafts.get_by_slug(&slug).await?.is_none() {
        return Err(AppError::NotFound("Draft not found".to_string()));
    }

    let path = temp_video_path(&slug, ext);
    let bucket = &state.config().storage.temp_video_bucket;
    let size = file.bytes.len();

    state
        .storage()
        .upload(bucket, &path, file.bytes, &file.content_type)
        .await?;
    let temp_url = state.storage().public_url(bucket, &path);
    drafts.set_temp_video(&slug, &temp_url).await?;

    tracing::info!(%slug, %path, size, "Temp video staged");
    Ok(Json(TempVideoResponse {
        temp_url,
        file_id: path,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoResponse {
    pub photo_url: String,
    pub accent_color: String,
}

/// POST /api/upload-photo
#[instrument(skip(state, multipart))]
pub async fn upload_photo(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PhotoResponse>> {
    let (slug, file) = UploadForm::read(multipart, MAX_PHOTO_BYTES).await?.require()?;
    let ext = photo_extension(&file.content_type).ok_or_else(|| {
        AppError::UnsupportedMediaType("Only JPEG, PNG or WebP photos are supported.".to_string())
    })?;

    let drafts = DraftRepository::new(state.pool());
    if drafts.get_by_slug(&slug).await?.is_none() {
        return Err(AppError::NotFound("Draft not found".to_string()));
    }

    let bytes = file.bytes;
    let sample = bytes.clone();
    let accent_color = tokio::task::spawn_blocking(move || accent_color_or_default(&sample))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let path = format!("drafts/{slug}.{ext}");
    let bucket = &state.config().storage.photo_bucket;
    state
        .storage()
        .upload(bucket, &path, bytes, &file.content_type)
        .await?;
    let photo_url = state.storage().public_url(bucket, &path);
    drafts.set_photo(&slug, &photo_url, &accent_color).await?;

    tracing::info!(%slug, %accent_color, "Photo uploaded");
    Ok(Json(PhotoResponse {
        photo_url,
        accent_color,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_video_extension() {
        assert_eq!(video_extension("video/mp4"), Some("mp4"));
        assert_eq!(video_extension("video/quicktime"), Some("mov"));
        assert_eq!(video_extension("video/webm"), Some("webm"));
        assert_eq!(video_extension("video/x-msvideo"), None);
    }

    #[test]
    fn test_temp_video_path_is_slug_scoped() {
        let slug = Slug::parse("000042").unwrap();
        let path = temp_video_path(&slug, "mov");
        let (dir, name) = path.split_once('/').unwrap();
        assert_eq!(dir, "000042");
        let (id, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "mov");
        assert!(Uuid::parse_str(id).is_ok());
        assert_ne!(path, temp_video_path(&slug, "mov"));
    }

    #[test]
    fn test_photo_extension_rejects_heic() {
        assert_eq!(photo_extension("image/jpeg"), Some("jpg"));
        assert_eq!(photo_extension("image/heic"), None);
        assert_eq!(photo_extension("image/heif"), None);
    }

    #[test]
    fn test_require_reports_missing_parts() {
        let err = UploadForm::default().require().unwrap_err();
        assert_eq!(err.public_message(), "Missing slug.");

        let form = UploadForm {
            slug: Some("000001".into()),
            file: None,
        };
        assert_eq!(form.require().unwrap_err().public_message(), "Missing file.");
    }
}
