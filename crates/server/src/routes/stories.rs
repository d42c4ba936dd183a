//! Published tributes: JSON API, moments and the `/h/{slug}` page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use dash_memories_core::Slug;

use super::parse_slug;
use crate::db::{DraftRepository, NewMoment, StoryRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, Draft, Moment, Story, StoryWithMoments};
use crate::services::pdf::format_short_month;
use crate::state::AppState;

/// Longest accepted moment caption, in characters.
const MAX_CAPTION_CHARS: usize = 2000;

/// GET /api/stories/{slug}
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<StoryWithMoments>> {
    let slug = parse_slug(&slug)?;
    StoryRepository::new(state.pool())
        .get_with_moments(&slug)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Story not found".to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMomentRequest {
    pub caption: String,
    pub photo_url: Option<String>,
    pub mux_playback_id: Option<String>,
}

impl NewMomentRequest {
    fn into_moment(self, author: &CurrentUser) -> Result<NewMoment> {
        let caption = self.caption.trim().to_string();
        if caption.is_empty() {
            return Err(AppError::BadRequest("Missing caption.".to_string()));
        }
        if caption.chars().count() > MAX_CAPTION_CHARS {
            return Err(AppError::BadRequest("Caption too long.".to_string()));
        }
        Ok(NewMoment {
            caption,
            photo_url: self.photo_url.filter(|u| !u.trim().is_empty()),
            mux_playback_id: self.mux_playback_id.filter(|p| !p.trim().is_empty()),
            author_user_id: Some(author.id),
        })
    }
}

/// Whether `user` owns the story: its recorded owner, or the email on the
/// draft it was published from.
#[must_use]
pub fn owns_story(story: &Story, draft: Option<&Draft>, user: &CurrentUser) -> bool {
    if story.user_id == Some(user.id) {
        return true;
    }
    draft
        .and_then(|d| d.email.as_ref())
        .is_some_and(|email| *email == user.email)
}

/// POST /api/stories/{slug}/moments
#[instrument(skip(state, user, req))]
pub async fn add_moment(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(slug): Path<String>,
    Json(req): Json<NewMomentRequest>,
) -> Result<(StatusCode, Json<Moment>)> {
    let slug = parse_slug(&slug)?;
    let stories = StoryRepository::new(state.pool());
    let story = stories
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Story not found".to_string()))?;

    let draft = DraftRepository::new(state.pool()).get_by_slug(&slug).await?;
    if !owns_story(&story, draft.as_ref(), &user) {
        return Err(AppError::Forbidden(
            "Only the tribute owner can add moments.".to_string(),
        ));
    }

    let moment = stories
        .add_moment(story.id, &req.into_moment(&user)?)
        .await?;
    tracing::info!(%slug, moment_id = %moment.id, "Moment added");
    Ok((StatusCode::CREATED, Json(moment)))
}

/// A moment as shown on the tribute page.
#[derive(Debug)]
pub struct MomentView {
    pub caption: String,
    pub photo_url: Option<String>,
    pub playback_id: Option<String>,
    pub date: String,
}

impl From<Moment> for MomentView {
    fn from(moment: Moment) -> Self {
        Self {
            caption: moment.caption,
            photo_url: moment.photo_url,
            playback_id: moment.mux_playback_id,
            date: moment.created_at.format("%b %-d, %Y").to_string(),
        }
    }
}

/// Tribute page template.
#[derive(Template, WebTemplate)]
#[template(path = "tribute.html")]
pub struct TributeTemplate {
    pub slug: String,
    pub full_name: String,
    pub dates: String,
    pub photo_url: Option<String>,
    pub accent_color: String,
    pub playback_id: Option<String>,
    /// Staged video shown while the draft is unpaid.
    pub preview_video_url: Option<String>,
    pub published: bool,
    pub moments: Vec<MomentView>,
}

fn dates_line(birth: Option<&str>, death: Option<&str>) -> String {
    let birth = birth.map(format_short_month).unwrap_or_default();
    let death = death.map(format_short_month).unwrap_or_default();
    match (birth.is_empty(), death.is_empty()) {
        (false, false) => format!("{birth} \u{2013} {death}"),
        (false, true) => birth,
        (true, false) => death,
        (true, true) => String::new(),
    }
}

impl TributeTemplate {
    /// Whether the page embeds any hosted video.
    fn needs_player(&self) -> bool {
        self.playback_id.is_some() || self.moments.iter().any(|m| m.playback_id.is_some())
    }

    fn from_story(story: StoryWithMoments) -> Self {
        let StoryWithMoments { story, moments } = story;
        Self {
            dates: dates_line(story.birth_date.as_deref(), story.death_date.as_deref()),
            slug: story.slug.into_inner(),
            full_name: story.full_name.unwrap_or_default(),
            photo_url: story.photo_url,
            accent_color: story
                .accent_color
                .unwrap_or_else(|| crate::services::color::DEFAULT_ACCENT.to_string()),
            playback_id: story.mux_playback_id,
            preview_video_url: None,
            published: true,
            moments: moments.into_iter().map(MomentView::from).collect(),
        }
    }

    fn from_draft(draft: Draft) -> Self {
        Self {
            dates: dates_line(draft.birth_date.as_deref(), draft.death_date.as_deref()),
            playback_id: draft.videos.final_mux_playback_id.clone(),
            preview_video_url: draft.videos.pending_temp_url().map(String::from),
            slug: draft.slug.into_inner(),
            full_name: draft.full_name.unwrap_or_default(),
            photo_url: draft.photo_url,
            accent_color: draft
                .accent_color
                .unwrap_or_else(|| crate::services::color::DEFAULT_ACCENT.to_string()),
            published: false,
            moments: Vec::new(),
        }
    }
}

async fn load_tribute(state: &AppState, slug: &Slug) -> Result<TributeTemplate> {
    if let Some(story) = StoryRepository::new(state.pool())
        .get_with_moments(slug)
        .await?
    {
        return Ok(TributeTemplate::from_story(story));
    }
    DraftRepository::new(state.pool())
        .get_by_slug(slug)
        .await?
        .map(TributeTemplate::from_draft)
        .ok_or_else(|| AppError::NotFound("Tribute not found".to_string()))
}

/// GET /h/{slug}
#[instrument(skip(state))]
pub async fn tribute_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<TributeTemplate> {
    let slug = parse_slug(&slug)?;
    load_tribute(&state, &slug).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dash_memories_core::{DraftId, DraftStatus, DraftVideos, Email, StoryId, UserId};

    fn user(id: i32, email: &str) -> CurrentUser {
        CurrentUser {
            id: UserId::new(id),
            email: Email::parse(email).unwrap(),
        }
    }

    fn story(owner: Option<i32>) -> Story {
        Story {
            id: StoryId::new(1),
            slug: Slug::parse("000001").unwrap(),
            draft_id: Some(DraftId::new(1)),
            user_id: owner.map(UserId::new),
            full_name: Some("Ada Lovelace".into()),
            birth_date: Some("1815-12-10".into()),
            death_date: Some("1852-11-27".into()),
            photo_url: None,
            accent_color: None,
            mux_playback_id: Some("pb123".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn draft(email: Option<&str>) -> Draft {
        Draft {
            id: DraftId::new(1),
            slug: Slug::parse("000001").unwrap(),
            status: DraftStatus::Paid,
            user_id: None,
            email: email.map(|e| Email::parse(e).unwrap()),
            full_name: Some("Ada Lovelace".into()),
            birth_date: None,
            death_date: None,
            photo_url: None,
            accent_color: Some("#aa3366".into()),
            qr_url: None,
            qr_target: None,
            videos: DraftVideos::default().with_temp_url("https://x/temp-videos/000001/a.mp4"),
            print_pdf_url: None,
            mockup_url: None,
            checkout_session_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            paid_at: None,
        }
    }

    #[test]
    fn test_owner_by_user_id() {
        assert!(owns_story(&story(Some(7)), None, &user(7, "a@b.co")));
        assert!(!owns_story(&story(Some(7)), None, &user(8, "a@b.co")));
    }

    #[test]
    fn test_owner_by_draft_email() {
        let d = draft(Some("family@example.com"));
        assert!(owns_story(&story(None), Some(&d), &user(9, "family@example.com")));
        assert!(!owns_story(&story(None), Some(&d), &user(9, "other@example.com")));
        assert!(!owns_story(&story(None), Some(&draft(None)), &user(9, "a@b.co")));
    }

    #[test]
    fn test_moment_caption_validation() {
        let req = NewMomentRequest {
            caption: "   ".into(),
            photo_url: None,
            mux_playback_id: None,
        };
        assert!(req.into_moment(&user(1, "a@b.co")).is_err());

        let req = NewMomentRequest {
            caption: " Sunday dinners ".into(),
            photo_url: Some(String::new()),
            mux_playback_id: None,
        };
        let moment = req.into_moment(&user(1, "a@b.co")).unwrap();
        assert_eq!(moment.caption, "Sunday dinners");
        assert_eq!(moment.photo_url, None);
        assert_eq!(moment.author_user_id, Some(UserId::new(1)));
    }

    #[test]
    fn test_draft_page_shows_staged_video() {
        let page = TributeTemplate::from_draft(draft(None));
        assert!(!page.published);
        assert_eq!(
            page.preview_video_url.as_deref(),
            Some("https://x/temp-videos/000001/a.mp4")
        );
        assert_eq!(page.accent_color, "#aa3366");
        assert!(!page.needs_player());
    }

    #[test]
    fn test_story_page_renders() {
        let page = TributeTemplate::from_story(StoryWithMoments {
            story: story(None),
            moments: Vec::new(),
        });
        let html = page.render().unwrap();
        assert!(html.contains("Ada Lovelace"));
        assert!(html.contains("pb123"));
    }
}
