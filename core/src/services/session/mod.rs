//! Session lifecycle service.
//!
//! This module provides:
//! - Session creation with a signed access token, an opaque rotating
//!   refresh token, and an id-refresh marker token
//! - Stateless access-token verification with optional revocation checks
//! - Refresh-token rotation with replay classification and theft detection
//! - Claim regeneration and session revocation

mod config;
mod service;

#[cfg(test)]
mod tests;

pub use config::SessionServiceConfig;
pub use service::{CreateSessionParams, SessionService};
