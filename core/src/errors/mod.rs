//! Error taxonomy for the session core.
//!
//! `SessionError` is the closed vocabulary every service operation answers
//! with; `TokenError` and `StoreError` are the granular codec- and
//! storage-level failures that get translated at the service boundary.

mod types;

// Re-export all error types and utilities
pub use types::{StoreError, StoreResult, TokenError};

use portcullis_shared::types::ResponseStatus;
use thiserror::Error;

/// Session-level errors as callers observe them.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The access token is unusable (expired, bad signature, anti-CSRF
    /// mismatch); the caller should run a refresh and retry.
    #[error("try refresh token: {message}")]
    TryRefreshToken { message: String },

    /// The session is truly gone or the refresh token is not usable; the
    /// caller must force a fresh login.
    #[error("unauthorised: {message}")]
    Unauthorised { message: String },

    /// The refresh token is structurally invalid (wrong version tag, corrupt
    /// encoding); distinct from a well-formed token that fails lookup.
    #[error("invalid refresh token format: {message}")]
    InvalidRefreshTokenFormat { message: String },

    // Bridge to the storage layer
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// Key material could not be generated, loaded, or applied
    #[error("crypto failure: {message}")]
    Crypto { message: String },
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    pub fn try_refresh(message: impl Into<String>) -> Self {
        SessionError::TryRefreshToken {
            message: message.into(),
        }
    }

    pub fn unauthorised(message: impl Into<String>) -> Self {
        SessionError::Unauthorised {
            message: message.into(),
        }
    }

    pub fn invalid_refresh_format(message: impl Into<String>) -> Self {
        SessionError::InvalidRefreshTokenFormat {
            message: message.into(),
        }
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        SessionError::Crypto {
            message: message.into(),
        }
    }

    /// Maps the error onto the wire status vocabulary.
    ///
    /// Storage and crypto failures have no session-level status; transports
    /// surface them as plain server errors.
    pub fn status(&self) -> Option<ResponseStatus> {
        match self {
            SessionError::TryRefreshToken { .. } => Some(ResponseStatus::TryRefreshToken),
            SessionError::Unauthorised { .. } => Some(ResponseStatus::Unauthorised),
            SessionError::InvalidRefreshTokenFormat { .. } => Some(ResponseStatus::Unauthorised),
            SessionError::Storage(_) | SessionError::Crypto { .. } => None,
        }
    }
}
