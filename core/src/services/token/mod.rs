//! Token codecs for the session engine
//!
//! This module handles everything that turns state into tokens and back:
//! - JWT access tokens in two wire versions (HS256 legacy, Ed25519)
//! - Opaque AES-256-GCM refresh tokens
//! - Anti-CSRF values bound to token issuance
//!
//! The codecs are deliberately free of business logic: lookups and rotation
//! decisions live in the session service.

mod access;
mod anti_csrf;
mod refresh;

#[cfg(test)]
mod tests;

pub use access::{AccessTokenCodec, AccessTokenInput, VerifiedAccessToken};
pub use anti_csrf::{anti_csrf_matches, generate_anti_csrf_token};
pub use refresh::RefreshTokenCodec;
