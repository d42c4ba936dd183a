//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `DASH_BASE_URL` - Public URL of the site (QR targets, redirects, passkey origin)
//! - `SUPABASE_URL` - Supabase project URL (object storage)
//! - `SUPABASE_SERVICE_ROLE_KEY` - Service role key for storage writes
//! - `MUX_TOKEN_ID` / `MUX_TOKEN_SECRET` - Mux API credentials
//! - `STRIPE_SECRET_KEY` - Stripe API secret key
//! - `STRIPE_WEBHOOK_SECRET` - Stripe webhook signing secret
//! - `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD` - Outbound mail relay
//! - `OTP_SECRET` - Pepper mixed into stored one-time-code hashes
//!
//! ## Optional
//! - `DASH_HOST` - Bind address (default: 127.0.0.1)
//! - `DASH_PORT` - Listen port (default: 3000)
//! - `SMTP_PORT` - Relay port (default: 587)
//! - `SMTP_FROM` - Sender address (default: noreply@dash.gift)
//! - `PRINT_SHOP_EMAIL` - Print vendor inbox for order PDFs
//! - `TEST_PDF_EMAIL` - Overrides the vendor inbox and marks mail as a test print
//! - `STRIPE_PRICE_ID_ACRYLIC` - Checkout price for the acrylic keepsake
//! - `CRON_SECRET` - Bearer token required by the cleanup endpoint
//! - `OTP_DEBUG_CODE` - When `true`, send responses echo the code (development only)
//! - `OTP_TEST_EMAIL` / `OTP_TEST_CODE` - Review account that bypasses delivery
//! - `OTP_BYPASS` - When `true`, the test code is accepted for any email
//! - `TEMP_VIDEO_BUCKET` (default: temp-videos), `PHOTO_BUCKET` (default: photos),
//!   `PRINT_BUCKET` (default: prints)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct DashConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    pub host: IpAddr,
    pub port: u16,
    /// Public base URL without a trailing slash
    pub base_url: String,
    pub storage: StorageConfig,
    pub mux: MuxConfig,
    pub stripe: StripeConfig,
    pub email: EmailConfig,
    pub otp: OtpConfig,
    /// Bearer token for `/api/cron/cleanup`; unset leaves the endpoint open
    pub cron_secret: Option<SecretString>,
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    pub sentry_sample_rate: f32,
    pub sentry_traces_sample_rate: f32,
}

/// Supabase Storage configuration.
#[derive(Clone)]
pub struct StorageConfig {
    pub url: String,
    pub service_role_key: SecretString,
    pub temp_video_bucket: String,
    pub photo_bucket: String,
    pub print_bucket: String,
    pub mockup_bucket: String,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("url", &self.url)
            .field("service_role_key", &"[REDACTED]")
            .field("temp_video_bucket", &self.temp_video_bucket)
            .field("photo_bucket", &self.photo_bucket)
            .field("print_bucket", &self.print_bucket)
            .field("mockup_bucket", &self.mockup_bucket)
            .finish()
    }
}

/// Mux Video API credentials.
#[derive(Clone)]
pub struct MuxConfig {
    pub token_id: String,
    pub token_secret: SecretString,
}

impl std::fmt::Debug for MuxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxConfig")
            .field("token_id", &self.token_id)
            .field("token_secret", &"[REDACTED]")
            .finish()
    }
}

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
    pub acrylic_price_id: Option<String>,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("acrylic_price_id", &self.acrylic_price_id)
            .finish()
    }
}

/// Outbound email configuration.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
    /// Print vendor inbox
    pub print_shop_email: Option<String>,
    /// Test inbox that takes precedence over the vendor
    pub test_pdf_email: Option<String>,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .field("print_shop_email", &self.print_shop_email)
            .field("test_pdf_email", &self.test_pdf_email)
            .finish()
    }
}

impl EmailConfig {
    /// Where vendor PDFs go and whether this is a test print.
    ///
    /// Returns `None` when neither inbox is configured.
    #[must_use]
    pub fn vendor_recipient(&self) -> Option<(&str, bool)> {
        self.test_pdf_email
            .as_deref()
            .map(|addr| (addr, true))
            .or_else(|| self.print_shop_email.as_deref().map(|addr| (addr, false)))
    }
}

/// Email one-time-code configuration.
#[derive(Clone)]
pub struct OtpConfig {
    pub secret: SecretString,
    pub debug_code: bool,
    pub test_email: Option<String>,
    pub test_code: String,
    pub bypass: bool,
}

impl std::fmt::Debug for OtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpConfig")
            .field("secret", &"[REDACTED]")
            .field("debug_code", &self.debug_code)
            .field("test_email", &self.test_email)
            .field("test_code", &"[REDACTED]")
            .field("bypass", &self.bypass)
            .finish()
    }
}

impl DashConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = SecretString::from(get_required_env("DATABASE_URL")?);
        let host = get_parsed_or_default("DASH_HOST", "127.0.0.1")?;
        let port = get_parsed_or_default("DASH_PORT", "3000")?;
        let base_url = normalize_base_url(&get_required_env("DASH_BASE_URL")?)?;

        let cron_secret = get_optional_env("CRON_SECRET")
            .map(|value| {
                validate_secret_strength(&value, "CRON_SECRET")?;
                Ok::<_, ConfigError>(SecretString::from(value))
            })
            .transpose()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            storage: StorageConfig::from_env()?,
            mux: MuxConfig::from_env()?,
            stripe: StripeConfig::from_env()?,
            email: EmailConfig::from_env()?,
            otp: OtpConfig::from_env()?,
            cron_secret,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_parsed_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: get_parsed_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Absolute URL for a site path.
    #[must_use]
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: normalize_base_url(&get_required_env("SUPABASE_URL")?)?,
            service_role_key: SecretString::from(get_required_env("SUPABASE_SERVICE_ROLE_KEY")?),
            temp_video_bucket: get_env_or_default("TEMP_VIDEO_BUCKET", "temp-videos"),
            photo_bucket: get_env_or_default("PHOTO_BUCKET", "photos"),
            print_bucket: get_env_or_default("PRINT_BUCKET", "prints"),
            mockup_bucket: get_env_or_default("MOCKUP_BUCKET", "mockups"),
        })
    }
}

impl MuxConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            token_id: get_required_env("MUX_TOKEN_ID")?,
            token_secret: SecretString::from(get_required_env("MUX_TOKEN_SECRET")?),
        })
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: SecretString::from(get_required_env("STRIPE_SECRET_KEY")?),
            webhook_secret: SecretString::from(get_required_env("STRIPE_WEBHOOK_SECRET")?),
            acrylic_price_id: get_optional_env("STRIPE_PRICE_ID_ACRYLIC"),
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            smtp_host: get_required_env("SMTP_HOST")?,
            smtp_port: get_parsed_or_default("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: SecretString::from(get_required_env("SMTP_PASSWORD")?),
            from_address: get_env_or_default("SMTP_FROM", "noreply@dash.gift"),
            print_shop_email: get_optional_env("PRINT_SHOP_EMAIL"),
            test_pdf_email: get_optional_env("TEST_PDF_EMAIL"),
        })
    }
}

impl OtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let test_code = get_env_or_default("OTP_TEST_CODE", "123456");
        if test_code.len() != 6 || !test_code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::InvalidEnvVar(
                "OTP_TEST_CODE".to_string(),
                "must be exactly 6 digits".to_string(),
            ));
        }

        Ok(Self {
            secret: get_validated_secret("OTP_SECRET")?,
            debug_code: get_flag("OTP_DEBUG_CODE"),
            test_email: get_optional_env("OTP_TEST_EMAIL").map(|e| e.trim().to_lowercase()),
            test_code,
            bypass: get_flag("OTP_BYPASS"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn get_parsed_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// `1`, `true` and `yes` (any case) enable a flag.
fn get_flag(key: &str) -> bool {
    get_optional_env(key).is_some_and(|v| {
        matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
    })
}

/// Validate an absolute http(s) URL and drop any trailing slash.
fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(raw.to_string(), e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            raw.to_string(),
            "must be an http(s) URL".to_string(),
        ));
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Reject placeholders and low-entropy values.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
