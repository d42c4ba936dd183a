//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use moka::future::Cache;
use sqlx::PgPool;
use url::Url;
use webauthn_rs::prelude::*;

use crate::config::DashConfig;
use crate::services::email::EmailService;
use crate::services::mux::{MuxClient, MuxError};
use crate::services::storage::{StorageClient, StorageError};
use crate::services::stripe::{StripeClient, StripeError};

/// Rendered QR PNGs kept in memory.
const QR_CACHE_CAPACITY: u64 = 1_000;
const QR_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum AppStateError {
    #[error("invalid base_url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("base_url must have a host")]
    MissingHost,
    #[error("webauthn error: {0}")]
    WebAuthn(#[from] WebauthnError),
    #[error("storage client: {0}")]
    Storage(#[from] StorageError),
    #[error("mux client: {0}")]
    Mux(#[from] MuxError),
    #[error("stripe client: {0}")]
    Stripe(#[from] StripeError),
    #[error("smtp transport: {0}")]
    Email(#[from] lettre::transport::smtp::Error),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: DashConfig,
    pool: PgPool,
    storage: StorageClient,
    mux: MuxClient,
    stripe: StripeClient,
    email: EmailService,
    http: reqwest::Client,
    webauthn: Webauthn,
    qr_cache: Cache<String, Bytes>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Service configuration
    /// * `pool` - `PostgreSQL` connection pool
    ///
    /// # Errors
    ///
    /// Returns an error if the `WebAuthn` configuration is invalid or a
    /// service client cannot be built.
    pub fn new(config: DashConfig, pool: PgPool) -> Result<Self, AppStateError> {
        let storage = StorageClient::new(&config.storage)?;
        let mux = MuxClient::new(&config.mux, &config.base_url)?;
        let stripe = StripeClient::new(&config.stripe)?;
        let email = EmailService::new(&config.email)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let webauthn = create_webauthn(&config)?;
        let qr_cache = Cache::builder()
            .max_capacity(QR_CACHE_CAPACITY)
            .time_to_live(QR_CACHE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                storage,
                mux,
                stripe,
                email,
                http,
                webauthn,
                qr_cache,
            }),
        })
    }

    /// Get a reference to the service configuration.
    #[must_use]
    pub fn config(&self) -> &DashConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Object storage (temp videos, photos, prints).
    #[must_use]
    pub fn storage(&self) -> &StorageClient {
        &self.inner.storage
    }

    /// Video host client.
    #[must_use]
    pub fn mux(&self) -> &MuxClient {
        &self.inner.mux
    }

    #[must_use]
    pub fn stripe(&self) -> &StripeClient {
        &self.inner.stripe
    }

    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    /// Plain HTTP client for fetching public assets such as draft photos.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Get a reference to the `WebAuthn` configuration.
    #[must_use]
    pub fn webauthn(&self) -> &Webauthn {
        &self.inner.webauthn
    }

    /// Rendered QR codes keyed by [`QrOptions::cache_key`](crate::services::qr::QrOptions::cache_key).
    #[must_use]
    pub fn qr_cache(&self) -> &Cache<String, Bytes> {
        &self.inner.qr_cache
    }
}

/// Create a `WebAuthn` instance from configuration.
fn create_webauthn(config: &DashConfig) -> Result<Webauthn, AppStateError> {
    let url = Url::parse(&config.base_url)?;

    let rp_id = url
        .host_str()
        .ok_or(AppStateError::MissingHost)?
        .to_owned();

    let builder = WebauthnBuilder::new(&rp_id, &url)?
        .rp_name("DASH Memories")
        .allow_subdomains(false);

    Ok(builder.build()?)
}
