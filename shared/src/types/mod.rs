//! Wire-contract types for the HTTP layer.
//!
//! The webserver that fronts the core lives in a separate crate; these types
//! pin down the request/response shapes and the closed status vocabulary it
//! must speak. Everything here is plain serde data — no behavior beyond
//! constructors.

pub mod response;

// Re-export commonly used types at module level
pub use response::{
    CreateSessionRequest, RefreshSessionRequest, RegenerateTokenRequest, ResponseStatus,
    RevokeSessionRequest, RevokedSessionsResponse, SessionHandlesResponse, SessionInfoPayload,
    SessionResponse, TokenPayload, VerifySessionRequest,
};
