//! Domain entities representing sessions, tokens, and signing keys.

pub mod session;
pub mod signing_key;
pub mod token;

// Re-export commonly used types
pub use session::{PastTokenRecord, SessionRecord};
pub use signing_key::{KeyKind, KeyValueRecord, PublicSigningKey, SigningKeyRecord};
pub use token::{
    AccessTokenClaims, RefreshTokenPayload, TokenBundle, TokenVersion,
    REFRESH_TOKEN_WIRE_VERSION,
};
