//! Hashing helpers shared by the token codecs and the session service.

use sha2::{Digest, Sha256};

/// Hashes a token for lookups, hex encoded.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Hashes a token into its stored form: `sha256(sha256(token))`, hex encoded.
///
/// Session rows and past-token rows only ever hold this double hash, so a
/// database leak exposes neither usable tokens nor their first-order hashes.
pub fn hash_token_twice(token: &str) -> String {
    hash_token(&hash_token(token))
}
