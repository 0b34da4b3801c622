//! Token entities: access token claims, the encrypted refresh payload, and
//! the bundle shape every minted token is returned in.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version suffix carried by every opaque refresh token on the wire
pub const REFRESH_TOKEN_WIRE_VERSION: &str = "V1";

/// Access token wire format versions.
///
/// `V1` tokens are signed with the shared legacy secret (HS256); `V2` tokens
/// are signed with a stored Ed25519 key named by the `kid` header. The
/// version is also embedded in the claims so a token can never be replayed
/// under a different verification path than it was minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenVersion {
    V1,
    V2,
}

impl TokenVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenVersion::V1 => "V1",
            TokenVersion::V2 => "V2",
        }
    }
}

/// Claims carried by every access token.
///
/// Expiry lives in `expiryTime` (epoch millis) and is checked against the
/// injected clock rather than through the JWT `exp` claim, so verification
/// stays deterministic under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenClaims {
    /// Session this token belongs to
    pub session_handle: String,

    /// Subject of the session
    pub user_id: String,

    /// JSON claims mirrored from the session row at issuance
    pub user_data: Value,

    /// Expiry as epoch millis
    pub expiry_time: i64,

    /// Issuance instant as epoch millis
    pub time_created: i64,

    /// Issuance-ordering stamp (epoch millis, bumped monotonically when
    /// claims are regenerated)
    pub lmrt: i64,

    /// Anti-CSRF value minted alongside this token; absent when the session
    /// runs without anti-CSRF
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anti_csrf_token: Option<String>,

    /// Wire format version
    pub ver: TokenVersion,
}

impl AccessTokenClaims {
    /// Checks the embedded expiry against the given instant (epoch millis)
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expiry_time <= now_millis
    }
}

/// Payload sealed inside an opaque refresh token.
///
/// The whole structure is AES-256-GCM encrypted on the wire; nothing in it is
/// visible to or forgeable by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenPayload {
    /// Session this token was minted for
    pub session_handle: String,

    /// Stored-form (double) hash of the predecessor token; `None` for the
    /// first token of a session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_refresh_token_hash2: Option<String>,

    /// Strictly increasing rotation counter, 0 at session creation
    pub generation: u64,

    /// Anti-CSRF value minted alongside this token, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anti_csrf_token: Option<String>,

    /// Expiry as epoch millis; informational, the session row is
    /// authoritative
    pub expiry_time: i64,
}

/// A minted token together with its lifecycle instants (epoch millis).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBundle {
    pub token: String,
    pub expiry: i64,
    pub created_time: i64,
}

impl TokenBundle {
    pub fn new(token: String, expiry: i64, created_time: i64) -> Self {
        Self {
            token,
            expiry,
            created_time,
        }
    }
}
