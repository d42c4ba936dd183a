//! DASH Memories Core - Shared domain types.
//!
//! This crate provides the types used across all DASH Memories components:
//! - `server` - Public web service (drafts, uploads, checkout, tribute pages)
//! - `cli` - Command-line tools for migrations and maintenance sweeps
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Lifecycle rules (draft status transitions, slug
//! formats, pricing) live here so every binary enforces them identically.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, slugs, draft status, videos, pricing, print formats

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
