//! JSON API route groups that need their own layers.

pub mod webauthn;
