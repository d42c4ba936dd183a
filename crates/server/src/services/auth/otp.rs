//! Email one-time codes.
//!
//! Codes are six digits, valid for ten minutes, and stored only as
//! `sha256("{email}:{code}:{secret}")`.

use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::instrument;

use dash_memories_core::Email;

use super::AuthError;
use crate::config::OtpConfig;
use crate::db::OtpRepository;
use crate::db::otps::OtpRecord;
use crate::services::email::generate_code;

/// How long a code stays valid.
pub const CODE_TTL_MINUTES: i64 = 10;

/// Only this many of the newest unused codes are checked.
const CANDIDATE_LIMIT: i64 = 5;

/// Used or expired codes younger than this are kept.
const PURGE_AFTER_HOURS: i64 = 24;

/// A freshly issued code.
#[derive(Debug)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    /// True for the configured review account; no email should be sent.
    pub is_test_account: bool,
}

/// Hash a code for storage.
#[must_use]
pub fn hash_code(email: &Email, code: &str, secret: &str) -> String {
    let digest = Sha256::digest(format!("{}:{code}:{secret}", email.as_str()).as_bytes());
    hex::encode(digest)
}

/// Whether `code` is exactly six ASCII digits.
#[must_use]
pub fn is_well_formed(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Pick the matching candidate.
///
/// Expired candidates never match. No candidates at all, or a miss among
/// live ones, is `InvalidCode`; candidates that have all expired are
/// `CodeExpired`.
///
/// # Errors
///
/// Returns `AuthError::CodeExpired` or `AuthError::InvalidCode`.
pub fn check_codes<'a>(
    candidates: &'a [OtpRecord],
    hash: &str,
    now: DateTime<Utc>,
) -> Result<&'a OtpRecord, AuthError> {
    if candidates.is_empty() {
        return Err(AuthError::InvalidCode);
    }
    let mut live = candidates.iter().filter(|c| c.expires_at > now).peekable();
    if live.peek().is_none() {
        return Err(AuthError::CodeExpired);
    }
    live.find(|c| c.code_hash == hash)
        .ok_or(AuthError::InvalidCode)
}

/// Issues and verifies email one-time codes.
pub struct OtpService<'a> {
    otps: OtpRepository<'a>,
    config: &'a OtpConfig,
}

impl<'a> OtpService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, config: &'a OtpConfig) -> Self {
        Self {
            otps: OtpRepository::new(pool),
            config,
        }
    }

    fn is_test_account(&self, email: &Email) -> bool {
        self.config
            .test_email
            .as_deref()
            .is_some_and(|test| test == email.as_str())
    }

    /// Generate and store a new code for `email`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the code cannot be stored.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn issue(&self, email: &Email) -> Result<IssuedCode, AuthError> {
        let now = Utc::now();
        let purged = self
            .otps
            .purge(email, now - Duration::hours(PURGE_AFTER_HOURS))
            .await?;
        if purged > 0 {
            tracing::debug!(purged, "Purged stale sign-in codes");
        }

        let is_test_account = self.is_test_account(email);
        let code = if is_test_account {
            self.config.test_code.clone()
        } else {
            generate_code()
        };
        let expires_at = now + Duration::minutes(CODE_TTL_MINUTES);
        let hash = hash_code(email, &code, self.config.secret.expose_secret());
        self.otps.insert(email, &hash, expires_at).await?;

        Ok(IssuedCode {
            code,
            expires_at,
            is_test_account,
        })
    }

    /// Verify a submitted code, consuming it on success.
    ///
    /// # Errors
    ///
    /// Returns `MalformedCode`, `CodeExpired`, `InvalidCode`, or a
    /// repository error.
    #[instrument(skip(self, code), fields(email = %email))]
    pub async fn verify(&self, email: &Email, code: &str) -> Result<(), AuthError> {
        let code = code.trim();
        if !is_well_formed(code) {
            return Err(AuthError::MalformedCode);
        }

        if (self.config.bypass || self.is_test_account(email)) && code == self.config.test_code {
            tracing::info!("Sign-in code accepted via test bypass");
            return Ok(());
        }

        let candidates = self.otps.recent_unused(email, CANDIDATE_LIMIT).await?;
        let hash = hash_code(email, code, self.config.secret.expose_secret());
        let matched = check_codes(&candidates, &hash, Utc::now())?;

        if !self.otps.mark_used(matched.id).await? {
            // Consumed concurrently by another request.
            return Err(AuthError::InvalidCode);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dash_memories_core::OtpId;

    fn email() -> Email {
        Email::parse("family@example.com").unwrap()
    }

    fn record(id: i32, code: &str, expires_in_minutes: i64, now: DateTime<Utc>) -> OtpRecord {
        OtpRecord {
            id: OtpId::new(id),
            code_hash: hash_code(&email(), code, "pepper"),
            expires_at: now + Duration::minutes(expires_in_minutes),
        }
    }

    #[test]
    fn test_hash_is_stable_hex() {
        let a = hash_code(&email(), "123456", "pepper");
        let b = hash_code(&email(), "123456", "pepper");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_code(&email(), "123456", "other"));
        assert_ne!(a, hash_code(&email(), "654321", "pepper"));
    }

    #[test]
    fn test_well_formed() {
        assert!(is_well_formed("012345"));
        assert!(!is_well_formed("12345"));
        assert!(!is_well_formed("1234567"));
        assert!(!is_well_formed("12a456"));
        assert!(!is_well_formed("１２３４５６"));
    }

    #[test]
    fn test_matching_live_code() {
        let now = Utc::now();
        let candidates = vec![record(2, "222222", 5, now), record(1, "111111", 5, now)];
        let hash = hash_code(&email(), "111111", "pepper");
        assert_eq!(check_codes(&candidates, &hash, now).unwrap().id, OtpId::new(1));
    }

    #[test]
    fn test_all_expired() {
        let now = Utc::now();
        let candidates = vec![record(1, "111111", -1, now)];
        let hash = hash_code(&email(), "111111", "pepper");
        assert!(matches!(
            check_codes(&candidates, &hash, now),
            Err(AuthError::CodeExpired)
        ));
    }

    #[test]
    fn test_no_candidates_is_invalid() {
        let hash = hash_code(&email(), "111111", "pepper");
        assert!(matches!(
            check_codes(&[], &hash, Utc::now()),
            Err(AuthError::InvalidCode)
        ));
    }

    #[test]
    fn test_malformed_code_reads_as_invalid() {
        assert_eq!(AuthError::MalformedCode.to_string(), "Invalid code.");
    }

    #[test]
    fn test_expired_match_is_invalid_when_others_live() {
        let now = Utc::now();
        let candidates = vec![record(2, "222222", 5, now), record(1, "111111", -1, now)];
        let hash = hash_code(&email(), "111111", "pepper");
        assert!(matches!(
            check_codes(&candidates, &hash, now),
            Err(AuthError::InvalidCode)
        ));
    }
}
