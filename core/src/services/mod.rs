//! Business services containing the session domain logic.

pub mod cleanup;
pub mod session;
pub mod signing_key;
pub mod token;

// Re-export commonly used types
pub use cleanup::{CleanupResult, CleanupService};
pub use session::{CreateSessionParams, SessionService, SessionServiceConfig};
pub use signing_key::SigningKeyStore;
pub use token::{AccessTokenCodec, RefreshTokenCodec, VerifiedAccessToken};
