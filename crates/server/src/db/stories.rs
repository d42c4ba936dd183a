//! Story and moment repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use dash_memories_core::{DraftId, MomentId, Slug, StoryId, UserId};

use super::RepositoryError;
use crate::models::{Draft, Moment, Story, StoryWithMoments};

const STORY_COLUMNS: &str = "id, slug, draft_id, user_id, full_name, birth_date, death_date, \
     photo_url, accent_color, mux_playback_id, created_at, updated_at";

const MOMENT_COLUMNS: &str =
    "id, story_id, caption, photo_url, mux_playback_id, author_user_id, created_at";

#[derive(sqlx::FromRow)]
struct StoryRow {
    id: i32,
    slug: String,
    draft_id: Option<i32>,
    user_id: Option<i32>,
    full_name: Option<String>,
    birth_date: Option<String>,
    death_date: Option<String>,
    photo_url: Option<String>,
    accent_color: Option<String>,
    mux_playback_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoryRow> for Story {
    type Error = RepositoryError;

    fn try_from(row: StoryRow) -> Result<Self, Self::Error> {
        let slug = Slug::parse(&row.slug).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid slug in database: {e}"))
        })?;
        Ok(Self {
            id: StoryId::new(row.id),
            slug,
            draft_id: row.draft_id.map(DraftId::new),
            user_id: row.user_id.map(UserId::new),
            full_name: row.full_name,
            birth_date: row.birth_date,
            death_date: row.death_date,
            photo_url: row.photo_url,
            accent_color: row.accent_color,
            mux_playback_id: row.mux_playback_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MomentRow {
    id: i32,
    story_id: i32,
    caption: String,
    photo_url: Option<String>,
    mux_playback_id: Option<String>,
    author_user_id: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<MomentRow> for Moment {
    fn from(row: MomentRow) -> Self {
        Self {
            id: MomentId::new(row.id),
            story_id: StoryId::new(row.story_id),
            caption: row.caption,
            photo_url: row.photo_url,
            mux_playback_id: row.mux_playback_id,
            author_user_id: row.author_user_id.map(UserId::new),
            created_at: row.created_at,
        }
    }
}

/// A moment to add to a story.
#[derive(Debug, Clone)]
pub struct NewMoment {
    pub caption: String,
    pub photo_url: Option<String>,
    pub mux_playback_id: Option<String>,
    pub author_user_id: Option<UserId>,
}

/// Repository for published stories.
pub struct StoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StoryRepository<'a> {
    /// Create a new story repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Publish (or refresh) the story for a paid draft, keyed by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, draft), fields(slug = %draft.slug))]
    pub async fn publish_from_draft(&self, draft: &Draft) -> Result<Story, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO stories (slug, draft_id, user_id, full_name, birth_date, death_date,
                                 photo_url, accent_color, mux_playback_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (slug) DO UPDATE SET
                draft_id = EXCLUDED.draft_id,
                user_id = COALESCE(EXCLUDED.user_id, stories.user_id),
                full_name = EXCLUDED.full_name,
                birth_date = EXCLUDED.birth_date,
                death_date = EXCLUDED.death_date,
                photo_url = EXCLUDED.photo_url,
                accent_color = EXCLUDED.accent_color,
                mux_playback_id = COALESCE(EXCLUDED.mux_playback_id, stories.mux_playback_id),
                updated_at = now()
            RETURNING {STORY_COLUMNS}
            "
        );
        sqlx::query_as::<_, StoryRow>(&sql)
            .bind(draft.slug.as_str())
            .bind(draft.id.as_i32())
            .bind(draft.user_id.map(|id| id.as_i32()))
            .bind(draft.full_name.as_deref())
            .bind(draft.birth_date.as_deref())
            .bind(draft.death_date.as_deref())
            .bind(draft.photo_url.as_deref())
            .bind(draft.accent_color.as_deref())
            .bind(draft.videos.final_mux_playback_id.as_deref())
            .fetch_one(self.pool)
            .await?
            .try_into()
    }

    /// Get a story by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &Slug) -> Result<Option<Story>, RepositoryError> {
        let sql = format!("SELECT {STORY_COLUMNS} FROM stories WHERE slug = $1");
        sqlx::query_as::<_, StoryRow>(&sql)
            .bind(slug.as_str())
            .fetch_optional(self.pool)
            .await?
            .map(Story::try_from)
            .transpose()
    }

    /// Get a story with all of its moments.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_with_moments(
        &self,
        slug: &Slug,
    ) -> Result<Option<StoryWithMoments>, RepositoryError> {
        let Some(story) = self.get_by_slug(slug).await? else {
            return Ok(None);
        };
        let moments = self.moments(story.id).await?;
        Ok(Some(StoryWithMoments { story, moments }))
    }

    /// Moments for a story, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn moments(&self, story_id: StoryId) -> Result<Vec<Moment>, RepositoryError> {
        let sql = format!(
            "SELECT {MOMENT_COLUMNS} FROM story_moments WHERE story_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, MomentRow>(&sql)
            .bind(story_id.as_i32())
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(Moment::from).collect())
    }

    /// Add a moment to a story.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, moment))]
    pub async fn add_moment(
        &self,
        story_id: StoryId,
        moment: &NewMoment,
    ) -> Result<Moment, RepositoryError> {
        let sql = format!(
            "INSERT INTO story_moments (story_id, caption, photo_url, mux_playback_id, author_user_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {MOMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MomentRow>(&sql)
            .bind(story_id.as_i32())
            .bind(&moment.caption)
            .bind(moment.photo_url.as_deref())
            .bind(moment.mux_playback_id.as_deref())
            .bind(moment.author_user_id.map(|id| id.as_i32()))
            .fetch_one(self.pool)
            .await?;
        Ok(row.into())
    }
}
