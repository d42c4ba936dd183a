//! Published tribute types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use dash_memories_core::{DraftId, MomentId, Slug, StoryId, UserId};

/// A published tribute, created from a paid draft.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: StoryId,
    pub slug: Slug,
    pub draft_id: Option<DraftId>,
    pub user_id: Option<UserId>,
    pub full_name: Option<String>,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub photo_url: Option<String>,
    pub accent_color: Option<String>,
    pub mux_playback_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A memory shared on a tribute.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Moment {
    pub id: MomentId,
    pub story_id: StoryId,
    pub caption: String,
    pub photo_url: Option<String>,
    pub mux_playback_id: Option<String>,
    pub author_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Story plus its moments, newest moment first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryWithMoments {
    #[serde(flatten)]
    pub story: Story,
    pub moments: Vec<Moment>,
}
