//! Signing-key records and the named key-value entry used for the refresh
//! token master key.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Which rotation family a signing key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// Created once and never rotated; tokens signed with it verify forever
    Static,
    /// Rotated on a fixed interval; old keys verify only within a retention
    /// window after creation
    Dynamic,
}

impl KeyKind {
    /// Storage column value for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Static => "static",
            KeyKind::Dynamic => "dynamic",
        }
    }
}

/// A stored Ed25519 signing key pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningKeyRecord {
    /// Unique id, also used as the JWT `kid` header value
    pub key_id: String,

    /// Rotation family
    pub kind: KeyKind,

    /// Index of the rotation interval this key was created for; always 0 for
    /// static keys
    pub bucket: i64,

    /// Signature algorithm name as it appears in JWT headers
    pub algorithm: String,

    /// base64url-encoded raw 32-byte verifying key
    pub public_key: String,

    /// base64-encoded 32-byte signing seed
    pub private_key: String,

    /// When the key was created
    pub created_at: DateTime<Utc>,
}

impl SigningKeyRecord {
    /// Whether the key may still verify tokens at `now`.
    ///
    /// Static keys verify forever. Dynamic keys verify until `retention` has
    /// elapsed since their creation, which keeps tokens signed just before a
    /// rotation verifiable through the grace window.
    pub fn verifies_at(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        match self.kind {
            KeyKind::Static => true,
            KeyKind::Dynamic => self.created_at + retention > now,
        }
    }
}

/// Publishable half of a signing key, for verification by other services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSigningKey {
    pub key_id: String,
    pub algorithm: String,
    pub public_key: String,
}

impl From<&SigningKeyRecord> for PublicSigningKey {
    fn from(record: &SigningKeyRecord) -> Self {
        Self {
            key_id: record.key_id.clone(),
            algorithm: record.algorithm.clone(),
            public_key: record.public_key.clone(),
        }
    }
}

/// A named storage entry.
///
/// The only entry the core writes today holds the base64-encoded master key
/// for refresh-token encryption, created lazily on first use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueRecord {
    pub name: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}
