//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Responses carry a JSON body of the form `{"error": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::email::EmailError;
use crate::services::fulfillment::FulfillmentError;
use crate::services::mockup::MockupError;
use crate::services::mux::MuxError;
use crate::services::pdf::PdfError;
use crate::services::prints::PrintError;
use crate::services::qr::QrError;
use crate::services::storage::StorageError;
use crate::services::stripe::StripeError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Object storage, Mux or Stripe failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Signed in, but not allowed to touch this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Upload exceeds its size limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Upload type is not accepted.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => Self::NotFound(path),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<MuxError> for AppError {
    fn from(err: MuxError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<StripeError> for AppError {
    fn from(err: StripeError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<EmailError> for AppError {
    fn from(err: EmailError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<PdfError> for AppError {
    fn from(err: PdfError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<QrError> for AppError {
    fn from(err: QrError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<MockupError> for AppError {
    fn from(err: MockupError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<PrintError> for AppError {
    fn from(err: PrintError) -> Self {
        match err {
            PrintError::Storage(e) => e.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<FulfillmentError> for AppError {
    fn from(err: FulfillmentError) -> Self {
        match err {
            FulfillmentError::DraftNotFound(_) => Self::NotFound("Draft not found".to_string()),
            FulfillmentError::Repository(e) => Self::Database(e),
            FulfillmentError::Print(e) => e.into(),
            FulfillmentError::Email(e) => e.into(),
        }
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_)
                | AuthError::MalformedCode
                | AuthError::CodeExpired
                | AuthError::InvalidCode => StatusCode::BAD_REQUEST,
                AuthError::UserNotFound
                | AuthError::NotAuthenticated
                | AuthError::NoCredentials
                | AuthError::InvalidSessionState
                | AuthError::WebAuthn(_) => StatusCode::UNAUTHORIZED,
                AuthError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Client-facing message. Internal details are never exposed.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(RepositoryError::NotFound) => "Not found".to_string(),
            Self::Database(RepositoryError::Conflict(_)) => "Already exists".to_string(),
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Upstream(_) => "External service error".to_string(),
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::MalformedCode | AuthError::CodeExpired | AuthError::InvalidCode => {
                    err.to_string()
                }
                AuthError::UserNotFound | AuthError::NoCredentials => {
                    "No passkeys registered for this account".to_string()
                }
                AuthError::NotAuthenticated => "Sign in required.".to_string(),
                AuthError::InvalidSessionState => "Session expired, please try again".to_string(),
                AuthError::WebAuthn(_) => "Passkey verification failed".to_string(),
                AuthError::Repository(_) => "Internal server error".to_string(),
            },
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::PayloadTooLarge(msg)
            | Self::UnsupportedMediaType(msg) => msg.clone(),
            Self::RateLimited => "Too many requests".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful sign-in to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
