//! Print artifact formats.

use serde::{Deserialize, Serialize};

/// A printable product rendered from a tribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PrintFormat {
    /// 4x6 in memorial card, photo side.
    #[default]
    CardFront,
    /// 4x6 in memorial card, passage and QR side.
    CardBack,
    /// 20x30 in mounted enlargement.
    Poster,
    /// 6x6 in acrylic keepsake.
    Acrylic,
}

impl PrintFormat {
    /// Trim size in inches (width, height), excluding bleed.
    #[must_use]
    pub const fn trim_inches(self) -> (f32, f32) {
        match self {
            Self::CardFront | Self::CardBack => (4.0, 6.0),
            Self::Poster => (20.0, 30.0),
            Self::Acrylic => (6.0, 6.0),
        }
    }

    /// Whether the artifact is printed with a bleed margin.
    #[must_use]
    pub const fn has_bleed(self) -> bool {
        !matches!(self, Self::Acrylic)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CardFront => "card-front",
            Self::CardBack => "card-back",
            Self::Poster => "poster",
            Self::Acrylic => "acrylic",
        }
    }

    /// Object name for the artifact of `slug` in the prints bucket.
    ///
    /// The card front is the canonical print and keeps the bare name.
    #[must_use]
    pub fn object_name(self, slug: &str) -> String {
        match self {
            Self::CardFront => format!("prints/{slug}.pdf"),
            other => format!("prints/{slug}-{}.pdf", other.as_str()),
        }
    }

    /// Attachment name used when emailing the vendor.
    #[must_use]
    pub fn attachment_name(self, slug: &str) -> String {
        format!("order-{slug}-{}.pdf", self.as_str())
    }
}

impl std::fmt::Display for PrintFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
