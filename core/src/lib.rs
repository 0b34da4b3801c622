//! # Portcullis Core
//!
//! Session, token, and signing-key lifecycle engine for the Portcullis backend.
//! This crate contains the session domain entities, the token codecs, the
//! storage contract every backend implements, and the service that ties the
//! refresh-rotation state machine together.

pub mod domain;
pub mod errors;
pub mod repositories;
pub mod services;
pub mod utils;

// Re-export commonly used types for convenience
pub use domain::*;
pub use errors::*;
pub use repositories::*;
pub use services::*;
