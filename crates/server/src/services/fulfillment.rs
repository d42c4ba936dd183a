//! Paid-checkout fulfillment.
//!
//! Runs when Stripe reports a completed checkout: finalize the staged video,
//! render and store the acrylic print, email it to the vendor, publish the
//! story and mark the draft paid.
//!
//! A published story is the record that fulfillment finished; draft status is
//! not, since `/api/checkout/verify` may flip it first. A failed video
//! migration is logged and does not block the order; the temp video stays
//! staged. Any other failure aborts before the story is published, so
//! Stripe's retry runs the whole sequence again.

use std::sync::Arc;

use dash_memories_core::{PrintFormat, Slug};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::DashConfig;
use crate::db::{DraftRepository, RepositoryError, StoryRepository};
use crate::models::{Draft, Story};
use crate::services::email::{EmailError, EmailService, PdfAttachment, VendorMailer, VendorOrder};
use crate::services::mux::{MuxClient, VideoHost};
use crate::services::pdf::PrintContent;
use crate::services::prints::{self, PrintError};
use crate::services::storage::{ObjectStorage, StorageClient};
use crate::services::stripe::CheckoutSession;
use crate::services::video_migration::{MigratedVideo, MigrationPolicy, VideoMigrator};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("no draft for checkout session {0}")]
    DraftNotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Print(#[from] PrintError),

    #[error(transparent)]
    Email(#[from] EmailError),
}

/// What a fulfillment run did.
#[derive(Debug)]
pub enum Fulfillment {
    /// The story was already published; nothing was reprocessed.
    AlreadyFulfilled { slug: Slug },
    Completed {
        slug: Slug,
        video: Option<MigratedVideo>,
        print_url: String,
        /// Whether the vendor email went out.
        vendor_notified: bool,
        story: Story,
    },
}

/// Locate the draft for a completed checkout session.
///
/// Looks up the recorded session id first, then falls back to the slug in
/// `client_reference_id`.
async fn find_draft(
    drafts: &DraftRepository<'_>,
    session: &CheckoutSession,
) -> Result<Draft, FulfillmentError> {
    if let Some(draft) = drafts.get_by_checkout_session(&session.id).await? {
        return Ok(draft);
    }
    if let Some(slug) = session.slug().and_then(|s| Slug::parse(s).ok())
        && let Some(draft) = drafts.get_by_slug(&slug).await?
    {
        return Ok(draft);
    }
    Err(FulfillmentError::DraftNotFound(session.id.clone()))
}

/// Fulfill a completed checkout with the live clients.
///
/// # Errors
///
/// See [`Fulfiller::fulfill`].
pub async fn fulfill_checkout(
    state: &AppState,
    session: &CheckoutSession,
) -> Result<Fulfillment, FulfillmentError> {
    Fulfiller::from_state(state).fulfill(session).await
}

/// Fulfillment over any storage, video host and vendor mailer.
pub struct Fulfiller<'a, S, V, M> {
    pool: &'a PgPool,
    config: &'a DashConfig,
    storage: &'a S,
    host: &'a V,
    mailer: &'a M,
    http: &'a reqwest::Client,
    policy: MigrationPolicy,
}

impl<'a> Fulfiller<'a, StorageClient, MuxClient, EmailService> {
    #[must_use]
    pub fn from_state(state: &'a AppState) -> Self {
        Fulfiller::new(
            state.pool(),
            state.config(),
            state.storage(),
            state.mux(),
            state.email(),
            state.http(),
        )
    }
}

impl<'a, S: ObjectStorage, V: VideoHost, M: VendorMailer> Fulfiller<'a, S, V, M> {
    #[must_use]
    pub fn new(
        pool: &'a PgPool,
        config: &'a DashConfig,
        storage: &'a S,
        host: &'a V,
        mailer: &'a M,
        http: &'a reqwest::Client,
    ) -> Self {
        Self {
            pool,
            config,
            storage,
            host,
            mailer,
            http,
            policy: MigrationPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: MigrationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fulfill a completed checkout.
    ///
    /// # Errors
    ///
    /// Returns `DraftNotFound` when no draft matches, or the first print,
    /// storage, email or database failure.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn fulfill(&self, session: &CheckoutSession) -> Result<Fulfillment, FulfillmentError> {
        let drafts = DraftRepository::new(self.pool);
        let stories = StoryRepository::new(self.pool);
        let mut draft = find_draft(&drafts, session).await?;
        let slug = draft.slug.clone();

        if stories.get_by_slug(&slug).await?.is_some() {
            if drafts.mark_paid(&slug).await? {
                info!(%slug, "Story already published, draft marked paid");
            } else {
                info!(%slug, "Story already published, skipping fulfillment");
            }
            return Ok(Fulfillment::AlreadyFulfilled { slug });
        }

        let video = match draft.videos.pending_temp_url().map(str::to_owned) {
            Some(temp_url) => {
                let migrator = VideoMigrator::new(
                    self.storage,
                    self.host,
                    &self.config.storage.temp_video_bucket,
                )
                .with_policy(self.policy);
                match migrator.migrate(slug.as_str(), &temp_url).await {
                    Ok(migrated) => {
                        draft = drafts.finalize_video(&slug, &migrated.playback_id).await?;
                        info!(%slug, playback_id = %migrated.playback_id, "Video finalized");
                        Some(migrated)
                    }
                    Err(e) => {
                        warn!(%slug, error = %e, "Video migration failed, keeping temp video");
                        None
                    }
                }
            }
            None => None,
        };

        let (print_url, pdf) = self.render_acrylic(&drafts, &draft).await?;

        let customer_email = session
            .email()
            .map(str::to_owned)
            .or_else(|| draft.email.as_ref().map(|e| e.as_str().to_owned()));
        let vendor_notified = self
            .send_to_vendor(&slug, customer_email.as_deref(), pdf)
            .await?;

        let draft = drafts
            .get_by_slug(&slug)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let story = stories.publish_from_draft(&draft).await?;
        info!(%slug, story_id = %story.id, "Story published");

        if !drafts.mark_paid(&slug).await? {
            info!(%slug, "Draft was already marked paid");
        }

        Ok(Fulfillment::Completed {
            slug,
            video,
            print_url,
            vendor_notified,
            story,
        })
    }

    /// Render the acrylic PDF, store it and record its URL on the draft.
    ///
    /// Returns the public URL and the PDF bytes.
    async fn render_acrylic(
        &self,
        drafts: &DraftRepository<'_>,
        draft: &Draft,
    ) -> Result<(String, Vec<u8>), FulfillmentError> {
        let slug = draft.slug.as_str();
        let photo = match draft.photo_url.as_deref() {
            Some(url) => match prints::fetch_photo(self.http, url).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(slug, error = %e, "Photo unavailable for acrylic print");
                    None
                }
            },
            None => None,
        };

        let content = PrintContent {
            photo,
            qr_target: self.config.absolute_url(&format!("/{slug}/acrylic")),
            full_name: draft.full_name.clone().unwrap_or_default(),
            birth_date: draft.birth_date.clone().unwrap_or_default(),
            death_date: draft.death_date.clone().unwrap_or_default(),
            ..PrintContent::default()
        };
        let bytes = prints::render(PrintFormat::Acrylic, Arc::new(content)).await?;
        let url = prints::store(
            self.storage,
            &self.config.storage.print_bucket,
            slug,
            PrintFormat::Acrylic,
            bytes.clone(),
        )
        .await?;
        drafts.set_print_pdf_url(&draft.slug, &url).await?;
        Ok((url, bytes))
    }

    /// Email the acrylic PDF to the vendor.
    ///
    /// Without a vendor inbox the order is logged and skipped, so an
    /// unconfigured deployment still completes payment.
    async fn send_to_vendor(
        &self,
        slug: &Slug,
        customer_email: Option<&str>,
        pdf: Vec<u8>,
    ) -> Result<bool, FulfillmentError> {
        let Some((_, is_test)) = self.mailer.vendor_recipient() else {
            warn!(%slug, "No vendor inbox configured, acrylic order not emailed");
            return Ok(false);
        };

        self.mailer
            .send_vendor_order(VendorOrder {
                slug: slug.as_str(),
                customer_email,
                subject_prefix: if is_test {
                    "Test Print PDF"
                } else {
                    "New Acrylic Order"
                },
                attachments: vec![PdfAttachment {
                    filename: PrintFormat::Acrylic.attachment_name(slug.as_str()),
                    bytes: pdf,
                }],
            })
            .await?;
        Ok(true)
    }
}
