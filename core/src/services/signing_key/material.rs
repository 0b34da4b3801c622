//! Ed25519 key material: generation and the bridge into JWT signing keys.
//!
//! Stored format is deliberately minimal: the private half is the base64 of
//! the raw 32-byte seed, the public half is base64url of the raw verifying
//! key, which is exactly what `DecodingKey::from_ed_components` consumes.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use uuid::Uuid;

use crate::domain::entities::{KeyKind, SigningKeyRecord};
use crate::errors::{SessionError, SessionResult};

/// Signature algorithm name stored and advertised for every key
pub const SIGNING_ALGORITHM: &str = "EdDSA";

/// Generates a fresh Ed25519 pair as a storable record.
///
/// The key id is prefixed with the kind (`s-`/`d-`) so a `kid` header is
/// self-describing in logs.
pub fn generate_key_record(
    kind: KeyKind,
    bucket: i64,
    created_at: DateTime<Utc>,
) -> SigningKeyRecord {
    let signing_key = SigningKey::generate(&mut OsRng);
    let prefix = match kind {
        KeyKind::Static => "s",
        KeyKind::Dynamic => "d",
    };

    SigningKeyRecord {
        key_id: format!("{}-{}", prefix, Uuid::new_v4()),
        kind,
        bucket,
        algorithm: SIGNING_ALGORITHM.to_string(),
        public_key: URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes()),
        private_key: STANDARD.encode(signing_key.to_bytes()),
        created_at,
    }
}

/// Rebuilds the JWT encoding key from a stored record
pub fn encoding_key(record: &SigningKeyRecord) -> SessionResult<EncodingKey> {
    let seed = STANDARD
        .decode(&record.private_key)
        .map_err(|e| SessionError::crypto(format!("signing seed is not valid base64: {e}")))?;
    let seed: [u8; 32] = seed
        .try_into()
        .map_err(|_| SessionError::crypto("signing seed must be exactly 32 bytes"))?;

    let der = SigningKey::from_bytes(&seed)
        .to_pkcs8_der()
        .map_err(|e| SessionError::crypto(format!("failed to encode signing key: {e}")))?;
    Ok(EncodingKey::from_ed_der(der.as_bytes()))
}

/// Rebuilds the JWT decoding key from the stored public half
pub fn decoding_key(record: &SigningKeyRecord) -> SessionResult<DecodingKey> {
    DecodingKey::from_ed_components(&record.public_key)
        .map_err(|e| SessionError::crypto(format!("stored public key is unusable: {e}")))
}
