//! Stripe client: Checkout Sessions and webhook verification.
//!
//! Stripe is called through its form-encoded REST API with `reqwest`; only
//! the handful of fields the payment flow reads are modeled.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::StripeConfig;

/// Stripe API base URL.
const BASE_URL: &str = "https://api.stripe.com/v1";

/// Maximum age of a webhook signature timestamp, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Event type fired when a customer completes Checkout.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Errors from the Stripe API.
#[derive(Debug, Error)]
pub enum StripeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stripe API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Webhook signature failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("timestamp outside tolerance")]
    TimestampOutOfTolerance,
    #[error("no matching signature")]
    Mismatch,
}

/// A Stripe Checkout Session (subset).
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

impl CheckoutSession {
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    /// Slug the session was created for.
    #[must_use]
    pub fn slug(&self) -> Option<&str> {
        self.metadata
            .get("slug")
            .map(String::as_str)
            .or(self.client_reference_id.as_deref())
    }

    /// Email the customer paid with.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .or(self.customer_email.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

/// A webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl Event {
    /// The embedded Checkout Session for `checkout.session.*` events.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::Parse` if the object is not a Checkout Session.
    pub fn checkout_session(&self) -> Result<CheckoutSession, StripeError> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| StripeError::Parse(format!("invalid checkout session: {e}")))
    }
}

/// Parameters for a new Checkout Session.
#[derive(Debug)]
pub struct NewCheckoutSession<'a> {
    pub price_id: &'a str,
    pub slug: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
    pub customer_email: Option<&'a str>,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: SecretString,
    webhook_secret: SecretString,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }

    /// Create a one-item payment Checkout Session.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip(self, params), fields(slug = params.slug))]
    pub async fn create_checkout_session(
        &self,
        params: &NewCheckoutSession<'_>,
    ) -> Result<CheckoutSession, StripeError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("line_items[0][price]", params.price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", params.success_url),
            ("cancel_url", params.cancel_url),
            ("client_reference_id", params.slug),
            ("metadata[slug]", params.slug),
        ];
        if let Some(email) = params.customer_email {
            form.push(("customer_email", email));
        }

        let response = self
            .client
            .post(format!("{BASE_URL}/checkout/sessions"))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&form)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Fetch a Checkout Session by id.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    #[instrument(skip(self))]
    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let response = self
            .client
            .get(format!(
                "{BASE_URL}/checkout/sessions/{}",
                urlencoding::encode(session_id)
            ))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Verify a webhook payload against the `Stripe-Signature` header.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] if the header is malformed, stale, or no
    /// `v1` signature matches.
    pub fn verify_webhook(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        verify_signature(
            payload,
            header,
            self.webhook_secret.expose_secret(),
            chrono::Utc::now().timestamp(),
        )
    }

    async fn parse<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, StripeError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| StripeError::Parse(e.to_string()))
    }
}

/// Check a `t=...,v1=...` signature header at time `now` (Unix seconds).
///
/// The signed payload is `"{t}.{body}"` under HMAC-SHA256; any `v1` entry
/// may match.
///
/// # Errors
///
/// See [`StripeClient::verify_webhook`].
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::MalformedHeader)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice compares in constant time
    let matched = signatures.iter().any(|sig| {
        hex::decode(sig).is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
    });
    if matched {
        debug!("Stripe signature verified");
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Build a signature header for `payload`, as Stripe would.
#[must_use]
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={timestamp}"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    )
}
