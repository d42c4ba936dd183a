//! Domain models for the server.
//!
//! Row types live next to their repositories in `db`; these are the
//! validated shapes handlers and services work with.

pub mod draft;
pub mod session;
pub mod story;
pub mod user;

pub use draft::Draft;
pub use session::{CurrentUser, keys as session_keys};
pub use story::{Moment, Story, StoryWithMoments};
pub use user::{User, UserPasskey};
