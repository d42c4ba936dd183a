//! Mux Video API client.
//!
//! Only the direct-upload flow is used: create an upload slot, PUT the bytes
//! to the returned URL, then follow the upload to its asset and the asset to
//! its public playback id.

use std::future::Future;

use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::config::MuxConfig;
use crate::services::retry::Transient;

/// Mux Video API base URL.
const BASE_URL: &str = "https://api.mux.com/video/v1";

/// Errors from the video host.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mux API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The upload was rejected while Mux processed it.
    #[error("upload {0} errored")]
    UploadErrored(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl Transient for MuxError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(err) => !err.is_builder() && !err.is_decode(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::UploadErrored(_) | Self::Parse(_) => false,
        }
    }
}

/// A direct upload slot.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectUpload {
    pub id: String,
    /// Signed URL the bytes are PUT to.
    pub url: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
}

/// Asset summary.
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub playback_ids: Vec<PlaybackId>,
}

impl Asset {
    /// First playback id, if Mux has issued one.
    #[must_use]
    pub fn playback_id(&self) -> Option<&str> {
        self.playback_ids.first().map(|p| p.id.as_str())
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status.as_deref() == Some("ready")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackId {
    pub id: String,
    #[serde(default)]
    pub policy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Serialize)]
struct CreateUploadRequest<'a> {
    cors_origin: &'a str,
    new_asset_settings: NewAssetSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    passthrough: Option<&'a str>,
}

#[derive(Serialize)]
struct NewAssetSettings {
    playback_policy: [&'static str; 1],
    mp4_support: &'static str,
}

/// Video hosting operations the migration pipeline needs.
pub trait VideoHost: Send + Sync {
    /// Create a direct upload slot.
    fn create_upload(
        &self,
        passthrough: Option<&str>,
    ) -> impl Future<Output = Result<DirectUpload, MuxError>> + Send;

    /// PUT file bytes to a direct upload URL.
    fn put_upload(
        &self,
        upload_url: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> impl Future<Output = Result<(), MuxError>> + Send;

    /// Current state of an upload.
    fn get_upload(&self, upload_id: &str) -> impl Future<Output = Result<DirectUpload, MuxError>> + Send;

    /// Current state of an asset.
    fn get_asset(&self, asset_id: &str) -> impl Future<Output = Result<Asset, MuxError>> + Send;
}

/// Mux API client.
#[derive(Clone)]
pub struct MuxClient {
    client: reqwest::Client,
    token_id: String,
    token_secret: SecretString,
    cors_origin: String,
}

impl MuxClient {
    /// Create a new Mux client.
    ///
    /// `cors_origin` is the site origin allowed to PUT browser uploads.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &MuxConfig, cors_origin: &str) -> Result<Self, MuxError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            token_id: config.token_id.clone(),
            token_secret: config.token_secret.clone(),
            cors_origin: cors_origin.to_string(),
        })
    }

    async fn parse<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, MuxError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MuxError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| MuxError::Parse(e.to_string()))?;
        Ok(envelope.data)
    }
}

impl VideoHost for MuxClient {
    #[instrument(skip(self))]
    async fn create_upload(&self, passthrough: Option<&str>) -> Result<DirectUpload, MuxError> {
        let body = CreateUploadRequest {
            cors_origin: &self.cors_origin,
            new_asset_settings: NewAssetSettings {
                playback_policy: ["public"],
                mp4_support: "standard",
            },
            passthrough,
        };

        let response = self
            .client
            .post(format!("{BASE_URL}/uploads"))
            .basic_auth(&self.token_id, Some(self.token_secret.expose_secret()))
            .json(&body)
            .send()
            .await?;
        Self::parse(response).await
    }

    #[instrument(skip(self, upload_url, bytes), fields(size = bytes.len()))]
    async fn put_upload(
        &self,
        upload_url: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), MuxError> {
        // Signed URL; no API credentials
        let response = self
            .client
            .put(upload_url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MuxError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_upload(&self, upload_id: &str) -> Result<DirectUpload, MuxError> {
        let response = self
            .client
            .get(format!("{BASE_URL}/uploads/{upload_id}"))
            .basic_auth(&self.token_id, Some(self.token_secret.expose_secret()))
            .send()
            .await?;
        Self::parse(response).await
    }

    #[instrument(skip(self))]
    async fn get_asset(&self, asset_id: &str) -> Result<Asset, MuxError> {
        let response = self
            .client
            .get(format!("{BASE_URL}/assets/{asset_id}"))
            .basic_auth(&self.token_id, Some(self.token_secret.expose_secret()))
            .send()
            .await?;
        Self::parse(response).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upload_envelope() {
        let json = r#"{"data":{"id":"up_1","url":"https://storage.mux.com/up_1","status":"waiting","timeout":3600}}"#;
        let envelope: Envelope<DirectUpload> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.data.id, "up_1");
        assert!(envelope.data.asset_id.is_none());
    }

    #[test]
    fn test_asset_playback_id() {
        let json = r#"{"id":"as_1","status":"ready","playback_ids":[{"id":"pb_1","policy":"public"}]}"#;
        let asset: Asset = serde_json::from_str(json).unwrap();
        assert_eq!(asset.playback_id(), Some("pb_1"));
        assert!(asset.is_ready());

        let pending: Asset = serde_json::from_str(r#"{"id":"as_2","status":"preparing"}"#).unwrap();
        assert_eq!(pending.playback_id(), None);
    }

    #[test]
    fn test_create_upload_request_shape() {
        let body = CreateUploadRequest {
            cors_origin: "https://dash.test",
            new_asset_settings: NewAssetSettings {
                playback_policy: ["public"],
                mp4_support: "standard",
            },
            passthrough: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["new_asset_settings"]["playback_policy"][0], "public");
        assert!(value.get("passthrough").is_none());
    }

    #[test]
    fn test_upload_errored_is_permanent() {
        assert!(!MuxError::UploadErrored("up_1".into()).is_transient());
        assert!(MuxError::Api { status: 502, message: String::new() }.is_transient());
    }
}
