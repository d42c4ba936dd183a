//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Email one-time codes, `dash_session` sessions, `WebAuthn` passkeys
//! - `email` - SMTP delivery of sign-in codes and vendor print orders
//! - `storage` - Supabase Storage client behind the [`storage::ObjectStorage`] seam
//! - `mux` - Mux client behind the [`mux::VideoHost`] seam
//! - `retry` - Bounded retry and polling with backoff
//! - `video_migration` - Temp video to Mux migration
//! - `stripe` - Checkout sessions and webhook signature verification
//! - `pdf` / `prints` - Print layouts and their render/store pipeline
//! - `qr` - QR code matrices and PNG rendering
//! - `color` - Accent color extraction from photos
//! - `mockup` - Acrylic keepsake preview image
//! - `fulfillment` - Paid-checkout processing
//! - `cleanup` - 24-hour sweep of temp videos and abandoned drafts

pub mod auth;
pub mod cleanup;
pub mod color;
pub mod email;
pub mod fulfillment;
pub mod mockup;
pub mod mux;
pub mod pdf;
pub mod prints;
pub mod qr;
pub mod retry;
pub mod storage;
pub mod stripe;
pub mod video_migration;
