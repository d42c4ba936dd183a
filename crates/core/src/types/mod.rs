//! Core types for DASH Memories.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod price;
pub mod print;
pub mod slug;
pub mod status;
pub mod videos;

pub use email::{Email, EmailError};
pub use id::*;
pub use price::{AddOn, Price, Tier, calculate_total};
pub use print::PrintFormat;
pub use slug::{Slug, SlugError};
pub use status::{DraftStatus, StatusError};
pub use videos::DraftVideos;
