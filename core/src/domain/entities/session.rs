//! Session entities: the durable session row and the per-token audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A durable session row.
///
/// The handle stays stable for the whole life of the session while the
/// refresh token rotates underneath it. Only the double hash of the current
/// refresh token is stored, never the token itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque unique identifier, stable across refreshes
    pub session_handle: String,

    /// Subject this session belongs to
    pub user_id: String,

    /// Double SHA-256 of the currently valid refresh token
    pub refresh_token_hash2: String,

    /// Server-side JSON blob, never embedded in tokens
    pub user_data_in_database: Value,

    /// JSON claims mirrored into every access token minted for this session
    pub user_data_in_jwt: Value,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// When the session (and its current refresh token) expires
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Checks whether the session has expired at the given instant
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Audit row for a refresh token that was minted for a session.
///
/// One row is written per minted token. The parent pointer chains each token
/// to its predecessor, which is what lets a benign replay of the previous
/// token be told apart from a stolen one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastTokenRecord {
    /// Double SHA-256 of the minted token
    pub refresh_token_hash2: String,

    /// Session the token was minted for
    pub session_handle: String,

    /// Double hash of the predecessor token; the first token of a session
    /// points at itself
    pub parent_refresh_token_hash2: String,

    /// When the token was minted
    pub created_at: DateTime<Utc>,
}
