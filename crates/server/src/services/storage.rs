//! Object storage client (Supabase Storage REST API).
//!
//! Three buckets are used:
//! - temp videos, staged until payment and swept after 24 hours
//! - photos, one per draft at `drafts/{slug}.{ext}`
//! - prints, generated PDFs at `prints/{slug}[-{format}].pdf`
//!
//! The [`ObjectStorage`] trait is the seam the video pipeline and the cleanup
//! sweep depend on; [`StorageClient`] is the production implementation.

use std::future::Future;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::config::StorageConfig;
use crate::services::retry::Transient;

/// Errors from the storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid storage configuration: {0}")]
    Config(String),
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(err) => !err.is_builder() && !err.is_decode(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound(_) | Self::Config(_) => false,
        }
    }
}

/// A downloaded object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    /// Content type reported by the backend, if any.
    pub content_type: Option<String>,
}

/// Minimal object storage interface.
pub trait ObjectStorage: Send + Sync {
    /// Upload (or overwrite) an object.
    fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Fetch an object's bytes.
    fn download(
        &self,
        bucket: &str,
        path: &str,
    ) -> impl Future<Output = Result<StoredObject, StorageError>> + Send;

    /// Delete objects. Missing objects are not an error.
    fn remove(
        &self,
        bucket: &str,
        paths: &[String],
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Public URL for an object in a public bucket.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Supabase Storage client.
#[derive(Clone)]
pub struct StorageClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct RemoveRequest<'a> {
    prefixes: &'a [String],
}

impl StorageClient {
    /// Create a storage client authenticated with the service role key.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let key = config.service_role_key.expose_secret();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| StorageError::Config(format!("invalid service role key: {e}")))?,
        );
        headers.insert(
            "apikey",
            HeaderValue::from_str(key)
                .map_err(|e| StorageError::Config(format!("invalid service role key: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/storage/v1", config.url.trim_end_matches('/')),
        })
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/object/{bucket}/{}", self.base_url, encode_path(path))
    }

    async fn check(response: reqwest::Response, path: &str) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        Err(StorageError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

impl ObjectStorage for StorageClient {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let response = self
            .client
            .post(self.object_url(bucket, path))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .header("cache-control", "max-age=3600")
            .body(bytes)
            .send()
            .await?;
        Self::check(response, path).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn download(&self, bucket: &str, path: &str) -> Result<StoredObject, StorageError> {
        let response = self.client.get(self.object_url(bucket, path)).send().await?;
        let response = Self::check(response, path).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response.bytes().await?.to_vec();

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }

    #[instrument(skip(self), fields(count = paths.len()))]
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), StorageError> {
        if paths.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .delete(format!("{}/object/{bucket}", self.base_url))
            .json(&RemoveRequest { prefixes: paths })
            .send()
            .await?;
        match Self::check(response, bucket).await {
            Ok(_) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/object/public/{bucket}/{}", self.base_url, encode_path(path))
    }
}

/// Percent-encode each segment of an object path, keeping the slashes.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Recover an object path from one of the bucket's URLs.
///
/// Looks for the `/{bucket}/` marker in the URL path, so both public and
/// authenticated object URLs work. Returns `None` for URLs that do not point
/// into the bucket.
#[must_use]
pub fn extract_object_path(object_url: &str, bucket: &str) -> Option<String> {
    let parsed = url::Url::parse(object_url).ok()?;
    let marker = format!("/{bucket}/");
    let path = parsed.path();
    let start = path.find(&marker)? + marker.len();
    let encoded = path.get(start..)?;
    if encoded.is_empty() {
        return None;
    }
    urlencoding::decode(encoded).ok().map(|p| p.into_owned())
}

/// Best-effort content type from a file name's extension.
#[must_use]
pub fn guess_video_content_type(path: &str) -> &'static str {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".mov") {
        "video/quicktime"
    } else if lower.ends_with(".webm") {
        "video/webm"
    } else {
        "video/mp4"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_object_path_from_public_url() {
        let url = "https://proj.supabase.co/storage/v1/object/public/temp-videos/000042/abc.mp4";
        assert_eq!(
            extract_object_path(url, "temp-videos").as_deref(),
            Some("000042/abc.mp4")
        );
    }

    #[test]
    fn test_extract_object_path_decodes_segments() {
        let url = "https://proj.supabase.co/storage/v1/object/public/temp-videos/000042/my%20video.MOV";
        assert_eq!(
            extract_object_path(url, "temp-videos").as_deref(),
            Some("000042/my video.MOV")
        );
    }

    #[test]
    fn test_extract_object_path_rejects_other_buckets() {
        let url = "https://proj.supabase.co/storage/v1/object/public/photos/drafts/000042.jpg";
        assert_eq!(extract_object_path(url, "temp-videos"), None);
        assert_eq!(extract_object_path("not a url", "temp-videos"), None);
        assert_eq!(
            extract_object_path("https://x.test/temp-videos/", "temp-videos"),
            None
        );
    }

    #[test]
    fn test_guess_video_content_type() {
        assert_eq!(guess_video_content_type("a/b.MOV"), "video/quicktime");
        assert_eq!(guess_video_content_type("a/b.webm"), "video/webm");
        assert_eq!(guess_video_content_type("a/b.mp4"), "video/mp4");
        assert_eq!(guess_video_content_type("a/b"), "video/mp4");
    }

    #[test]
    fn test_public_url_encodes_path() {
        let client = StorageClient::new(&crate::config::tests::test_config().storage).unwrap();
        assert_eq!(
            client.public_url("temp-videos", "000042/my video.mp4"),
            "https://proj.supabase.co/storage/v1/object/public/temp-videos/000042/my%20video.mp4"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::Api { status: 503, message: String::new() }.is_transient());
        assert!(StorageError::Api { status: 429, message: String::new() }.is_transient());
        assert!(!StorageError::Api { status: 403, message: String::new() }.is_transient());
        assert!(!StorageError::NotFound("x".into()).is_transient());
    }
}
