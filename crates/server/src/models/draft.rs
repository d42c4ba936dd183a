//! Draft domain type.

use chrono::{DateTime, Utc};
use serde::Serialize;

use dash_memories_core::{DraftId, DraftStatus, DraftVideos, Email, Slug, UserId};

/// An in-progress tribute.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: DraftId,
    pub slug: Slug,
    pub status: DraftStatus,
    pub user_id: Option<UserId>,
    pub email: Option<Email>,
    pub full_name: Option<String>,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub photo_url: Option<String>,
    pub accent_color: Option<String>,
    pub qr_url: Option<String>,
    /// URL the printed QR code resolves to; immutable once set.
    pub qr_target: Option<String>,
    pub videos: DraftVideos,
    pub print_pdf_url: Option<String>,
    pub mockup_url: Option<String>,
    #[serde(skip_serializing)]
    pub checkout_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Draft {
    /// Whether `user` may edit this draft.
    ///
    /// Drafts created before sign-in have no owner and stay editable by slug.
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId, email: &Email) -> bool {
        match (&self.user_id, &self.email) {
            (None, None) => true,
            (Some(owner), _) if *owner == user_id => true,
            (_, Some(owner_email)) => owner_email == email,
            _ => false,
        }
    }

    /// Editor path for this draft.
    #[must_use]
    pub fn editor_path(&self) -> String {
        format!("/heaven/{}/acrylic", self.slug)
    }
}
