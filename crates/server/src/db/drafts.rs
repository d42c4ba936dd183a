//! Draft repository.
//!
//! Status only ever moves `draft -> paid`: every write that could touch
//! status filters on `status = 'draft'`, and a trigger rejects the reverse.
//! `qr_target` is written through `COALESCE` so the first value wins.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use dash_memories_core::{DraftId, DraftStatus, DraftVideos, Email, Slug, UserId};

use super::{RepositoryError, conflict_or_database};
use crate::models::Draft;

/// Attempts at claiming the next sequential slug before giving up.
const SLUG_ATTEMPTS: u32 = 5;

const DRAFT_COLUMNS: &str = "id, slug, status, user_id, email, full_name, birth_date, \
     death_date, photo_url, accent_color, qr_url, qr_target, videos, print_pdf_url, \
     mockup_url, checkout_session_id, created_at, updated_at, paid_at";

#[derive(sqlx::FromRow)]
struct DraftRow {
    id: i32,
    slug: String,
    status: String,
    user_id: Option<i32>,
    email: Option<String>,
    full_name: Option<String>,
    birth_date: Option<String>,
    death_date: Option<String>,
    photo_url: Option<String>,
    accent_color: Option<String>,
    qr_url: Option<String>,
    qr_target: Option<String>,
    videos: Json<DraftVideos>,
    print_pdf_url: Option<String>,
    mockup_url: Option<String>,
    checkout_session_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

impl TryFrom<DraftRow> for Draft {
    type Error = RepositoryError;

    fn try_from(row: DraftRow) -> Result<Self, Self::Error> {
        let slug = Slug::parse(&row.slug).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid slug in database: {e}"))
        })?;
        let status: DraftStatus = row.status.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid draft status in database: {e}"))
        })?;
        let email = row
            .email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
            })?;

        Ok(Self {
            id: DraftId::new(row.id),
            slug,
            status,
            user_id: row.user_id.map(UserId::new),
            email,
            full_name: row.full_name,
            birth_date: row.birth_date,
            death_date: row.death_date,
            photo_url: row.photo_url,
            accent_color: row.accent_color,
            qr_url: row.qr_url,
            qr_target: row.qr_target,
            videos: row.videos.0,
            print_pdf_url: row.print_pdf_url,
            mockup_url: row.mockup_url,
            checkout_session_id: row.checkout_session_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            paid_at: row.paid_at,
        })
    }
}

/// Owner lookup key for [`DraftRepository::latest_for_owner`].
#[derive(Debug, Clone)]
pub enum DraftOwner {
    User(UserId),
    Email(Email),
}

/// Owner details written by the editor's save action.
#[derive(Debug, Clone)]
pub struct SaveDraft {
    pub slug: Slug,
    pub user_id: Option<UserId>,
    pub email: Option<Email>,
    pub full_name: Option<String>,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub photo_url: Option<String>,
}

/// Repository for draft database operations.
pub struct DraftRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DraftRepository<'a> {
    /// Create a new draft repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a draft under the next sequential slug.
    ///
    /// The sequence spans drafts and published stories so a slug is never
    /// reused. Concurrent creators race on the unique index; the loser retries
    /// with the next number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if no slug could be claimed.
    #[instrument(skip(self, email))]
    pub async fn create(
        &self,
        user_id: Option<UserId>,
        email: Option<&Email>,
    ) -> Result<Draft, RepositoryError> {
        for attempt in 1..=SLUG_ATTEMPTS {
            let slug = Slug::from_sequence(self.next_sequence().await?);
            let sql = format!(
                "INSERT INTO drafts (slug, user_id, email) VALUES ($1, $2, $3) RETURNING {DRAFT_COLUMNS}"
            );
            let result = sqlx::query_as::<_, DraftRow>(&sql)
                .bind(slug.as_str())
                .bind(user_id.map(|id| id.as_i32()))
                .bind(email.map(Email::as_str))
                .fetch_one(self.pool)
                .await;

            match result {
                Ok(row) => return row.try_into(),
                Err(e) => match conflict_or_database(e, "slug") {
                    RepositoryError::Conflict(_) => {
                        tracing::debug!(attempt, slug = %slug, "Slug taken, retrying");
                    }
                    other => return Err(other),
                },
            }
        }
        Err(RepositoryError::Conflict(
            "could not allocate a draft slug".to_owned(),
        ))
    }

    async fn next_sequence(&self) -> Result<u32, RepositoryError> {
        let max: i64 = sqlx::query_scalar(
            r"
            SELECT COALESCE(MAX(slug::bigint), 0)
            FROM (
                SELECT slug FROM drafts WHERE slug ~ '^[0-9]{1,9}$'
                UNION ALL
                SELECT slug FROM stories WHERE slug ~ '^[0-9]{1,9}$'
            ) numbered
            ",
        )
        .fetch_one(self.pool)
        .await?;

        u32::try_from(max + 1)
            .map_err(|_| RepositoryError::DataCorruption(format!("slug sequence overflow: {max}")))
    }

    /// Get a draft by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &Slug) -> Result<Option<Draft>, RepositoryError> {
        let sql = format!("SELECT {DRAFT_COLUMNS} FROM drafts WHERE slug = $1");
        sqlx::query_as::<_, DraftRow>(&sql)
            .bind(slug.as_str())
            .fetch_optional(self.pool)
            .await?
            .map(Draft::try_from)
            .transpose()
    }

    /// Get the draft a Stripe Checkout Session was created for.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Draft>, RepositoryError> {
        let sql = format!("SELECT {DRAFT_COLUMNS} FROM drafts WHERE checkout_session_id = $1");
        sqlx::query_as::<_, DraftRow>(&sql)
            .bind(session_id)
            .fetch_optional(self.pool)
            .await?
            .map(Draft::try_from)
            .transpose()
    }

    /// Most recently updated draft for an owner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn latest_for_owner(&self, owner: &DraftOwner) -> Result<Option<Draft>, RepositoryError> {
        let (column, sql_owner) = match owner {
            DraftOwner::User(id) => ("user_id", OwnerBind::Id(id.as_i32())),
            DraftOwner::Email(email) => ("email", OwnerBind::Text(email.as_str())),
        };
        let sql = format!(
            "SELECT {DRAFT_COLUMNS} FROM drafts WHERE {column} = $1 ORDER BY updated_at DESC LIMIT 1"
        );
        let query = sqlx::query_as::<_, DraftRow>(&sql);
        let query = match sql_owner {
            OwnerBind::Id(id) => query.bind(id),
            OwnerBind::Text(text) => query.bind(text),
        };
        query
            .fetch_optional(self.pool)
            .await?
            .map(Draft::try_from)
            .transpose()
    }

    /// Upsert owner details by slug.
    ///
    /// Absent fields keep their stored values. Status is never written here,
    /// so saving a paid draft leaves it paid.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, save), fields(slug = %save.slug))]
    pub async fn save(&self, save: &SaveDraft) -> Result<Draft, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO drafts (slug, user_id, email, full_name, birth_date, death_date, photo_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (slug) DO UPDATE SET
                user_id = COALESCE(EXCLUDED.user_id, drafts.user_id),
                email = COALESCE(EXCLUDED.email, drafts.email),
                full_name = COALESCE(EXCLUDED.full_name, drafts.full_name),
                birth_date = COALESCE(EXCLUDED.birth_date, drafts.birth_date),
                death_date = COALESCE(EXCLUDED.death_date, drafts.death_date),
                photo_url = COALESCE(EXCLUDED.photo_url, drafts.photo_url),
                updated_at = now()
            RETURNING {DRAFT_COLUMNS}
            "
        );
        sqlx::query_as::<_, DraftRow>(&sql)
            .bind(save.slug.as_str())
            .bind(save.user_id.map(|id| id.as_i32()))
            .bind(save.email.as_ref().map(Email::as_str))
            .bind(save.full_name.as_deref())
            .bind(save.birth_date.as_deref())
            .bind(save.death_date.as_deref())
            .bind(save.photo_url.as_deref())
            .fetch_one(self.pool)
            .await?
            .try_into()
    }

    /// Record an uploaded photo and its accent color.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no draft has this slug.
    pub async fn set_photo(
        &self,
        slug: &Slug,
        photo_url: &str,
        accent_color: &str,
    ) -> Result<Draft, RepositoryError> {
        let sql = format!(
            "UPDATE drafts SET photo_url = $2, accent_color = $3, updated_at = now() \
             WHERE slug = $1 RETURNING {DRAFT_COLUMNS}"
        );
        self.update_one(
            sqlx::query_as::<_, DraftRow>(&sql)
                .bind(slug.as_str())
                .bind(photo_url)
                .bind(accent_color),
        )
        .await
    }

    /// Point the draft at a newly staged video, keeping any final playback id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no draft has this slug.
    pub async fn set_temp_video(&self, slug: &Slug, temp_url: &str) -> Result<Draft, RepositoryError> {
        let sql = format!(
            "UPDATE drafts SET videos = jsonb_set(videos, '{{tempUrl}}', to_jsonb($2::text)), \
             updated_at = now() WHERE slug = $1 RETURNING {DRAFT_COLUMNS}"
        );
        self.update_one(
            sqlx::query_as::<_, DraftRow>(&sql)
                .bind(slug.as_str())
                .bind(temp_url),
        )
        .await
    }

    /// Store the permanent playback id and drop the staged URL.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no draft has this slug.
    pub async fn finalize_video(&self, slug: &Slug, playback_id: &str) -> Result<Draft, RepositoryError> {
        let sql = format!(
            "UPDATE drafts SET videos = (videos - 'tempUrl') \
             || jsonb_build_object('finalMuxPlaybackId', $2::text), updated_at = now() \
             WHERE slug = $1 RETURNING {DRAFT_COLUMNS}"
        );
        self.update_one(
            sqlx::query_as::<_, DraftRow>(&sql)
                .bind(slug.as_str())
                .bind(playback_id),
        )
        .await
    }

    /// Drop the staged URL after its object was swept.
    ///
    /// Returns `false` if the draft no longer exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear_temp_url(&self, id: DraftId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE drafts SET videos = videos - 'tempUrl', updated_at = now() WHERE id = $1",
        )
        .bind(id.as_i32())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the QR target unless one is already stored; returns the draft
    /// with whichever target won.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no draft has this slug.
    pub async fn set_qr_target(&self, slug: &Slug, target: &str) -> Result<Draft, RepositoryError> {
        let sql = format!(
            "UPDATE drafts SET qr_target = COALESCE(qr_target, $2), updated_at = now() \
             WHERE slug = $1 RETURNING {DRAFT_COLUMNS}"
        );
        self.update_one(
            sqlx::query_as::<_, DraftRow>(&sql)
                .bind(slug.as_str())
                .bind(target),
        )
        .await
    }

    /// Store the rendered QR image URL.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no draft has this slug.
    pub async fn set_qr_url(&self, slug: &Slug, qr_url: &str) -> Result<Draft, RepositoryError> {
        self.set_text_column(slug, "qr_url", qr_url).await
    }

    /// Record where the print PDF was stored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no draft has this slug.
    pub async fn set_print_pdf_url(&self, slug: &Slug, url: &str) -> Result<Draft, RepositoryError> {
        self.set_text_column(slug, "print_pdf_url", url).await
    }

    /// Record the product mockup image.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no draft has this slug.
    pub async fn set_mockup_url(&self, slug: &Slug, url: &str) -> Result<Draft, RepositoryError> {
        self.set_text_column(slug, "mockup_url", url).await
    }

    /// Remember the Checkout Session created for this draft.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no draft has this slug.
    pub async fn set_checkout_session(
        &self,
        slug: &Slug,
        session_id: &str,
    ) -> Result<Draft, RepositoryError> {
        self.set_text_column(slug, "checkout_session_id", session_id)
            .await
    }

    /// Transition `draft -> paid`.
    ///
    /// Returns `false` when the draft was already paid (or is missing); the
    /// transition never runs in reverse.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn mark_paid(&self, slug: &Slug) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE drafts SET status = 'paid', paid_at = now(), updated_at = now() \
             WHERE slug = $1 AND status = 'draft'",
        )
        .bind(slug.as_str())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drafts holding a staged video untouched since `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stale_temp_videos(&self, cutoff: DateTime<Utc>) -> Result<Vec<Draft>, RepositoryError> {
        let sql = format!(
            "SELECT {DRAFT_COLUMNS} FROM drafts \
             WHERE COALESCE(videos->>'tempUrl', '') <> '' AND updated_at < $1 \
             ORDER BY id"
        );
        self.fetch_many(sqlx::query_as::<_, DraftRow>(&sql).bind(cutoff))
            .await
    }

    /// Unpaid drafts created before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn expired_drafts(&self, cutoff: DateTime<Utc>) -> Result<Vec<Draft>, RepositoryError> {
        let sql = format!(
            "SELECT {DRAFT_COLUMNS} FROM drafts WHERE status = 'draft' AND created_at < $1 ORDER BY id"
        );
        self.fetch_many(sqlx::query_as::<_, DraftRow>(&sql).bind(cutoff))
            .await
    }

    /// Delete unpaid drafts by id in one statement. Paid drafts are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_many(&self, ids: &[DraftId]) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<i32> = ids.iter().map(DraftId::as_i32).collect();
        let result = sqlx::query("DELETE FROM drafts WHERE id = ANY($1) AND status = 'draft'")
            .bind(ids)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn set_text_column(
        &self,
        slug: &Slug,
        column: &'static str,
        value: &str,
    ) -> Result<Draft, RepositoryError> {
        let sql = format!(
            "UPDATE drafts SET {column} = $2, updated_at = now() WHERE slug = $1 RETURNING {DRAFT_COLUMNS}"
        );
        self.update_one(
            sqlx::query_as::<_, DraftRow>(&sql)
                .bind(slug.as_str())
                .bind(value),
        )
        .await
    }

    async fn update_one(
        &self,
        query: sqlx::query::QueryAs<'_, sqlx::Postgres, DraftRow, sqlx::postgres::PgArguments>,
    ) -> Result<Draft, RepositoryError> {
        query
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }

    async fn fetch_many(
        &self,
        query: sqlx::query::QueryAs<'_, sqlx::Postgres, DraftRow, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Draft>, RepositoryError> {
        query
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(Draft::try_from)
            .collect()
    }
}

enum OwnerBind<'a> {
    Id(i32),
    Text(&'a str),
}
