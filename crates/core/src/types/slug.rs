//! Tribute slugs.
//!
//! A slug is the public, human-readable key of a tribute: it appears in the
//! tribute URL, in the QR code printed on cards and acrylics, and in storage
//! object paths. Newly created drafts receive a sequential numeric slug
//! (`000042`); [`Slug::slugify`] derives one from free text.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Width of zero-padded sequential slugs.
pub const SEQUENCE_WIDTH: usize = 6;

/// Errors that can occur when parsing a [`Slug`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug cannot be empty")]
    Empty,
    #[error("slug must be at most {max} characters")]
    TooLong { max: usize },
    #[error("slug may only contain lowercase letters, digits and hyphens")]
    InvalidCharacter,
    #[error("slug cannot start or end with a hyphen")]
    EdgeHyphen,
}

/// A validated tribute slug.
///
/// ```
/// use dash_memories_core::Slug;
///
/// assert_eq!(Slug::from_sequence(42).as_str(), "000042");
/// assert_eq!(Slug::slugify("  Rose  Marie O'Neil ").unwrap().as_str(), "rose-marie-oneil");
/// assert!(Slug::parse("Has Spaces").is_err());
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    pub const MAX_LENGTH: usize = 64;

    /// Parse a slug, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns a [`SlugError`] if the slug is empty, too long, contains
    /// characters outside `[a-z0-9-]`, or begins/ends with a hyphen.
    pub fn parse(s: &str) -> Result<Self, SlugError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SlugError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(SlugError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(SlugError::InvalidCharacter);
        }
        if s.starts_with('-') || s.ends_with('-') {
            return Err(SlugError::EdgeHyphen);
        }
        Ok(Self(s.to_owned()))
    }

    /// Derive a slug from free text (typically the loved one's name).
    ///
    /// Lower-cases, drops anything that is not a word character, space or
    /// hyphen, and collapses runs of whitespace, underscores and hyphens into
    /// a single hyphen.
    ///
    /// # Errors
    ///
    /// Returns [`SlugError::Empty`] when nothing usable remains.
    pub fn slugify(text: &str) -> Result<Self, SlugError> {
        let mut out = String::with_capacity(text.len());
        let mut pending_hyphen = false;

        for c in text.trim().to_lowercase().chars() {
            if c.is_ascii_alphanumeric() {
                if pending_hyphen && !out.is_empty() {
                    out.push('-');
                }
                pending_hyphen = false;
                out.push(c);
            } else if c.is_whitespace() || c == '_' || c == '-' {
                pending_hyphen = true;
            }
        }

        out.truncate(Self::MAX_LENGTH);
        let trimmed = out.trim_end_matches('-');
        Self::parse(trimmed)
    }

    /// Sequential slug for the `n`th tribute, zero-padded to six digits.
    #[must_use]
    pub fn from_sequence(n: u32) -> Self {
        Self(format!("{n:0SEQUENCE_WIDTH$}"))
    }

    /// Numeric value of an all-digit slug.
    #[must_use]
    pub fn as_sequence(&self) -> Option<u32> {
        if self.0.bytes().all(|b| b.is_ascii_digit()) {
            self.0.parse().ok()
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Slug {
    type Err = SlugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Slug {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Slug {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Slug {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_valid_slugs() {
        assert_eq!(Slug::parse("000123").unwrap().as_str(), "000123");
        assert_eq!(Slug::parse(" john-doe-2 ").unwrap().as_str(), "john-doe-2");
    }

    #[test]
    fn test_parse_rejects_invalid_slugs() {
        assert_eq!(Slug::parse(""), Err(SlugError::Empty));
        assert_eq!(Slug::parse("John"), Err(SlugError::InvalidCharacter));
        assert_eq!(Slug::parse("a/b"), Err(SlugError::InvalidCharacter));
        assert_eq!(Slug::parse("-abc"), Err(SlugError::EdgeHyphen));
        assert_eq!(Slug::parse("abc-"), Err(SlugError::EdgeHyphen));
        assert!(matches!(
            Slug::parse(&"a".repeat(65)),
            Err(SlugError::TooLong { .. })
        ));
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(
            Slug::slugify("Mary   Ann__Smith--Jones").unwrap().as_str(),
            "mary-ann-smith-jones"
        );
        assert_eq!(Slug::slugify("--Hello, World!--").unwrap().as_str(), "hello-world");
        assert_eq!(Slug::slugify("!!!"), Err(SlugError::Empty));
    }

    #[test]
    fn test_sequence_padding() {
        assert_eq!(Slug::from_sequence(1).as_str(), "000001");
        assert_eq!(Slug::from_sequence(1_234_567).as_str(), "1234567");
        assert_eq!(Slug::from_sequence(42).as_sequence(), Some(42));
        assert_eq!(Slug::parse("rose-marie").unwrap().as_sequence(), None);
    }
}
