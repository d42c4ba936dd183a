//! Video references stored on a draft.
//!
//! Serialized as the `videos` JSON column:
//! `{"tempUrl": "...", "finalMuxPlaybackId": "..."}`.

use serde::{Deserialize, Serialize};

/// Staged and finalized video references for a draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftVideos {
    /// Public URL of the staged upload in temp storage, pending payment.
    #[serde(default)]
    pub temp_url: Option<String>,
    /// Playback id on the video host once migrated.
    #[serde(default)]
    pub final_mux_playback_id: Option<String>,
}

impl DraftVideos {
    /// Replace the staged video, keeping any finalized playback id.
    #[must_use]
    pub fn with_temp_url(self, temp_url: impl Into<String>) -> Self {
        Self {
            temp_url: Some(temp_url.into()),
            final_mux_playback_id: self.final_mux_playback_id,
        }
    }

    /// Record the permanent playback id and drop the staged URL.
    #[must_use]
    pub fn finalized(playback_id: impl Into<String>) -> Self {
        Self {
            temp_url: None,
            final_mux_playback_id: Some(playback_id.into()),
        }
    }

    /// Drop the staged URL after the object has been swept.
    #[must_use]
    pub fn without_temp_url(self) -> Self {
        Self {
            temp_url: None,
            ..self
        }
    }

    /// Staged URL, ignoring empty strings left by older clients.
    #[must_use]
    pub fn pending_temp_url(&self) -> Option<&str> {
        self.temp_url.as_deref().filter(|url| !url.trim().is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_camel_case() {
        let videos = DraftVideos::default().with_temp_url("https://x/temp-videos/a.mp4");
        let json = serde_json::to_value(&videos).unwrap();
        assert_eq!(json["tempUrl"], "https://x/temp-videos/a.mp4");
        assert!(json["finalMuxPlaybackId"].is_null());
    }

    #[test]
    fn test_missing_fields_default_to_none() {
        let videos: DraftVideos = serde_json::from_str("{}").unwrap();
        assert_eq!(videos, DraftVideos::default());
    }

    #[test]
    fn test_with_temp_url_keeps_final_id() {
        let videos = DraftVideos::finalized("play123").with_temp_url("https://x/new.mp4");
        assert_eq!(videos.final_mux_playback_id.as_deref(), Some("play123"));
        assert_eq!(videos.pending_temp_url(), Some("https://x/new.mp4"));
    }

    #[test]
    fn test_finalized_clears_temp_url() {
        let videos = DraftVideos::finalized("play123");
        assert!(videos.pending_temp_url().is_none());
        assert!(
            DraftVideos::default()
                .with_temp_url("  ")
                .pending_temp_url()
                .is_none()
        );
    }
}
