//! Granular error types for the token codecs and the storage layer.
//!
//! These never cross the service boundary directly: the session service
//! translates token failures into `TryRefreshToken`/`Unauthorised` and lets
//! storage failures bubble through as-is so transports can answer 500.

use thiserror::Error;

/// Failures raised by the access- and refresh-token codecs.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("malformed token: {reason}")]
    Malformed { reason: String },

    #[error("unknown signing key: {key_id}")]
    UnknownSigningKey { key_id: String },

    #[error("unsupported token version: {found}")]
    WrongVersion { found: String },

    #[error("token decryption failed")]
    Decrypt,

    // A key lookup can touch storage; keep that failure distinguishable from
    // a bad token so it is not answered with "try refresh"
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TokenError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        TokenError::Malformed {
            reason: reason.into(),
        }
    }
}

/// Failures raised by `SessionStore` implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Query or connection failure
    #[error("storage query failed: {message}")]
    Query { message: String },

    /// Conflict a caller may retry: deadlock, busy handle, serialization
    /// failure
    #[error("storage transaction conflict: {message}")]
    TransactionConflict { message: String },

    /// A row existed but could not be decoded into its record type
    #[error("row decode failed: {message}")]
    RowDecode { message: String },

    /// An optimistic operation gave up after its attempt budget
    #[error("atomic operation gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn query(message: impl Into<String>) -> Self {
        StoreError::Query {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        StoreError::TransactionConflict {
            message: message.into(),
        }
    }

    pub fn row_decode(message: impl Into<String>) -> Self {
        StoreError::RowDecode {
            message: message.into(),
        }
    }

    /// Whether retrying the whole read-modify-write cycle can help
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::TransactionConflict { .. })
    }
}
