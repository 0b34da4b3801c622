//! Shared utilities and common types for the Portcullis session core
//!
//! This crate provides functionality used across the workspace:
//! - Configuration types (environment-driven, no config-file loading)
//! - The injectable clock used by every time-sensitive decision
//! - Wire-contract types for the HTTP layer (status vocabulary, DTOs)
//! - The API-key gate helper

pub mod clock;
pub mod config;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CleanupSettings, CoreConfig, KeySettings, SessionSettings};
pub use types::{
    CreateSessionRequest, RefreshSessionRequest, RegenerateTokenRequest, ResponseStatus,
    RevokeSessionRequest, RevokedSessionsResponse, SessionHandlesResponse, SessionInfoPayload,
    SessionResponse, TokenPayload, VerifySessionRequest,
};
pub use utils::api_key::ApiKeyGate;
