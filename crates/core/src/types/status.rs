//! Draft lifecycle status.
//!
//! A draft starts as [`DraftStatus::Draft`] and becomes
//! [`DraftStatus::Paid`] once checkout completes. The transition is one-way:
//! nothing ever moves a paid tribute back to draft.

use serde::{Deserialize, Serialize};

/// Errors from status parsing and transitions.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("invalid draft status: {0}")]
    Invalid(String),
    #[error("cannot move draft from {from} to {to}")]
    Forbidden { from: DraftStatus, to: DraftStatus },
}

/// Payment status of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    #[default]
    Draft,
    Paid,
}

impl DraftStatus {
    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Staying in the same state is allowed so that repeated webhook
    /// deliveries are harmless.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Draft | Self::Paid) | (Self::Paid, Self::Paid)
        )
    }

    /// Check a transition, returning the target status when allowed.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::Forbidden`] for `paid -> draft`.
    pub const fn transition(self, next: Self) -> Result<Self, StatusError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StatusError::Forbidden {
                from: self,
                to: next,
            })
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Paid => "paid",
        }
    }

    #[must_use]
    pub const fn is_paid(self) -> bool {
        matches!(self, Self::Paid)
    }
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DraftStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "paid" => Ok(Self::Paid),
            other => Err(StatusError::Invalid(other.to_string())),
        }
    }
}
