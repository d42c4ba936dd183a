//! Temp video finalization.
//!
//! Moves a staged video out of temp storage onto the video host:
//!
//! 1. download from the temp bucket
//! 2. create a direct upload slot
//! 3. PUT the bytes
//! 4. wait for the upload to become an asset
//! 5. wait for the asset's playback id
//!
//! Every step is bounded by a [`RetryPolicy`]. The migrator writes nothing to
//! the database; callers persist the returned playback id, so a failed run
//! leaves the draft exactly as it was.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument};

use crate::services::mux::{MuxError, VideoHost};
use crate::services::retry::{RetryError, RetryPolicy};
use crate::services::storage::{
    ObjectStorage, StorageError, extract_object_path, guess_video_content_type,
};

/// Retry budgets for each migration step.
#[derive(Debug, Clone, Copy)]
pub struct MigrationPolicy {
    pub download: RetryPolicy,
    pub upload: RetryPolicy,
    pub asset: RetryPolicy,
    pub playback: RetryPolicy,
}

impl Default for MigrationPolicy {
    fn default() -> Self {
        Self {
            download: RetryPolicy::exponential(
                3,
                Duration::from_millis(1500),
                Duration::from_secs(6),
            ),
            upload: RetryPolicy::exponential(3, Duration::from_secs(2), Duration::from_secs(8)),
            asset: RetryPolicy::fixed(10, Duration::from_secs(3)),
            playback: RetryPolicy::fixed(10, Duration::from_secs(3)),
        }
    }
}

/// Result of a successful migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedVideo {
    pub asset_id: String,
    pub playback_id: String,
    /// Object path in the temp bucket the video was read from.
    pub temp_path: String,
}

/// Errors from [`VideoMigrator::migrate`].
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("slug is required")]
    MissingSlug,

    #[error("not a temp video URL: {0}")]
    InvalidTempUrl(String),

    #[error("downloading temp video failed: {0}")]
    Download(RetryError<StorageError>),

    #[error("creating upload failed: {0}")]
    CreateUpload(#[source] MuxError),

    #[error("uploading to video host failed: {0}")]
    Upload(RetryError<MuxError>),

    #[error("waiting for asset failed: {0}")]
    Asset(RetryError<MuxError>),

    #[error("waiting for playback id failed: {0}")]
    Playback(RetryError<MuxError>),
}

/// Runs the temp-to-host migration against any storage and video host.
pub struct VideoMigrator<'a, S, V> {
    storage: &'a S,
    host: &'a V,
    temp_bucket: &'a str,
    policy: MigrationPolicy,
}

impl<'a, S: ObjectStorage, V: VideoHost> VideoMigrator<'a, S, V> {
    #[must_use]
    pub fn new(storage: &'a S, host: &'a V, temp_bucket: &'a str) -> Self {
        Self {
            storage,
            host,
            temp_bucket,
            policy: MigrationPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: MigrationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Migrate the temp video at `temp_url` for `slug`.
    ///
    /// # Errors
    ///
    /// Fails on an empty slug, a URL outside the temp bucket, or once any
    /// step exhausts its retry budget.
    #[instrument(skip(self), fields(temp_bucket = self.temp_bucket))]
    pub async fn migrate(&self, slug: &str, temp_url: &str) -> Result<MigratedVideo, MigrationError> {
        if slug.trim().is_empty() {
            return Err(MigrationError::MissingSlug);
        }
        let temp_path = extract_object_path(temp_url, self.temp_bucket)
            .ok_or_else(|| MigrationError::InvalidTempUrl(temp_url.to_string()))?;

        let object = self
            .policy
            .download
            .retry("download_temp_video", |_| {
                self.storage.download(self.temp_bucket, &temp_path)
            })
            .await
            .map_err(MigrationError::Download)?;

        let content_type = object
            .content_type
            .as_deref()
            .filter(|ct| ct.starts_with("video/"))
            .unwrap_or_else(|| guess_video_content_type(&temp_path))
            .to_string();
        info!(slug, size = object.bytes.len(), %content_type, "Downloaded temp video");

        let upload = self
            .host
            .create_upload(Some(slug))
            .await
            .map_err(MigrationError::CreateUpload)?;

        self.policy
            .upload
            .retry("put_video_upload", |_| {
                self.host.put_upload(&upload.url, &object.bytes, &content_type)
            })
            .await
            .map_err(MigrationError::Upload)?;
        info!(slug, upload_id = %upload.id, "Uploaded video bytes");

        let asset_id = self
            .policy
            .asset
            .poll("wait_for_asset", |_| async {
                let current = self.host.get_upload(&upload.id).await?;
                if current.status.as_deref() == Some("errored") {
                    return Err(MuxError::UploadErrored(upload.id.clone()));
                }
                Ok::<_, MuxError>(current.asset_id)
            })
            .await
            .map_err(MigrationError::Asset)?;

        let playback_id = self
            .policy
            .playback
            .poll("wait_for_playback_id", |_| async {
                let asset = self.host.get_asset(&asset_id).await?;
                Ok::<_, MuxError>(asset.playback_id().map(String::from))
            })
            .await
            .map_err(MigrationError::Playback)?;

        info!(slug, %asset_id, %playback_id, "Video migrated");
        Ok(MigratedVideo {
            asset_id,
            playback_id,
            temp_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_budgets() {
        let policy = MigrationPolicy::default();
        assert_eq!(policy.download.max_attempts, 3);
        assert_eq!(policy.upload.max_attempts, 3);
        assert_eq!(policy.asset.max_attempts, 10);
        assert_eq!(policy.asset.delay_after(1), Duration::from_secs(3));
        assert_eq!(policy.playback.total_wait(), Duration::from_secs(27));
    }
}
