//! Access token codec: JWT minting and verification across both wire
//! versions.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde_json::Value;

use portcullis_shared::clock::Clock;

use crate::domain::entities::{AccessTokenClaims, KeyKind, TokenBundle, TokenVersion};
use crate::errors::{SessionError, SessionResult, StoreError, TokenError};
use crate::repositories::SessionStore;
use crate::services::signing_key::{material, SigningKeyStore};

/// Everything a new access token is minted from.
#[derive(Debug, Clone)]
pub struct AccessTokenInput {
    pub session_handle: String,
    pub user_id: String,
    pub user_data: Value,
    pub anti_csrf_token: Option<String>,
    /// Issuance-ordering stamp to embed
    pub lmrt: i64,
    /// Keep an existing expiry instead of starting a fresh validity window;
    /// used when re-signing or regenerating a token
    pub expiry_override: Option<i64>,
}

/// Outcome of verifying an access token.
#[derive(Debug, Clone)]
pub struct VerifiedAccessToken {
    pub claims: AccessTokenClaims,
    /// True when the signature checked out against a signing key that is no
    /// longer the current one; the caller should re-sign
    pub key_superseded: bool,
}

/// Mints and verifies JWT access tokens.
///
/// `V1` tokens are HS256 under the shared legacy secret; `V2` tokens are
/// Ed25519 under a stored key named by the `kid` header. Expiry is embedded
/// in the claims and checked against the injected clock, never through the
/// JWT `exp` machinery.
pub struct AccessTokenCodec<S: SessionStore> {
    signing_keys: Arc<SigningKeyStore<S>>,
    validity: Duration,
    legacy_secret: String,
    clock: Arc<dyn Clock>,
}

impl<S: SessionStore> AccessTokenCodec<S> {
    pub fn new(
        signing_keys: Arc<SigningKeyStore<S>>,
        validity: Duration,
        legacy_secret: String,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            signing_keys,
            validity,
            legacy_secret,
            clock,
        }
    }

    /// Mint a signed access token.
    ///
    /// `use_static_key` only matters for `V2`: it picks the non-rotating key
    /// family for deployments that pin their verifiers to one public key.
    pub async fn create(
        &self,
        version: TokenVersion,
        use_static_key: bool,
        input: AccessTokenInput,
    ) -> SessionResult<(TokenBundle, AccessTokenClaims)> {
        let now_millis = self.clock.now_millis();
        let expiry_time = input
            .expiry_override
            .unwrap_or_else(|| now_millis + self.validity.num_milliseconds());

        let claims = AccessTokenClaims {
            session_handle: input.session_handle,
            user_id: input.user_id,
            user_data: input.user_data,
            expiry_time,
            time_created: now_millis,
            lmrt: input.lmrt,
            anti_csrf_token: input.anti_csrf_token,
            ver: version,
        };

        let token = match version {
            TokenVersion::V1 => encode(
                &Header::new(Algorithm::HS256),
                &claims,
                &EncodingKey::from_secret(self.legacy_secret.as_bytes()),
            )
            .map_err(|e| SessionError::crypto(format!("failed to sign access token: {e}")))?,
            TokenVersion::V2 => {
                let kind = if use_static_key {
                    KeyKind::Static
                } else {
                    KeyKind::Dynamic
                };
                let key = self.signing_keys.key_for_signing(kind).await?;
                let mut header = Header::new(Algorithm::EdDSA);
                header.kid = Some(key.key_id.clone());
                encode(&header, &claims, &material::encoding_key(&key)?)
                    .map_err(|e| SessionError::crypto(format!("failed to sign access token: {e}")))?
            }
        };

        Ok((TokenBundle::new(token, expiry_time, now_millis), claims))
    }

    /// Verify signature and expiry
    pub async fn verify(&self, token: &str) -> Result<VerifiedAccessToken, TokenError> {
        self.verify_internal(token, true).await
    }

    /// Verify the signature but tolerate an expired token; claim
    /// regeneration must keep working on tokens past their expiry
    pub async fn verify_ignoring_expiry(
        &self,
        token: &str,
    ) -> Result<VerifiedAccessToken, TokenError> {
        self.verify_internal(token, false).await
    }

    async fn verify_internal(
        &self,
        token: &str,
        enforce_expiry: bool,
    ) -> Result<VerifiedAccessToken, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::malformed("not a JWT"))?;

        let (claims, key_superseded) = match header.alg {
            Algorithm::HS256 => {
                let key = DecodingKey::from_secret(self.legacy_secret.as_bytes());
                let claims = decode_claims(token, &key, Algorithm::HS256)?;
                if claims.ver != TokenVersion::V1 {
                    return Err(TokenError::malformed(
                        "token version does not match its signature algorithm",
                    ));
                }
                (claims, false)
            }
            Algorithm::EdDSA => {
                let key_id = header
                    .kid
                    .ok_or_else(|| TokenError::malformed("missing kid header"))?;
                let record = self
                    .signing_keys
                    .key_for_verifying(&key_id)
                    .await?
                    .ok_or(TokenError::UnknownSigningKey { key_id })?;

                // A stored key that cannot be rebuilt is server-side damage,
                // not a bad token; classify it with the storage failures
                let key = material::decoding_key(&record)
                    .map_err(|e| TokenError::Store(StoreError::row_decode(e.to_string())))?;
                let claims = decode_claims(token, &key, Algorithm::EdDSA)?;
                if claims.ver != TokenVersion::V2 {
                    return Err(TokenError::malformed(
                        "token version does not match its signature algorithm",
                    ));
                }
                (claims, self.signing_keys.is_superseded(&record))
            }
            other => {
                return Err(TokenError::WrongVersion {
                    found: format!("{other:?}"),
                })
            }
        };

        if enforce_expiry && claims.is_expired(self.clock.now_millis()) {
            return Err(TokenError::Expired);
        }

        Ok(VerifiedAccessToken {
            claims,
            key_superseded,
        })
    }
}

fn decode_claims(
    token: &str,
    key: &DecodingKey,
    alg: Algorithm,
) -> Result<AccessTokenClaims, TokenError> {
    // Expiry is ours to check against the injected clock; stop the JWT layer
    // from consulting the wall clock behind our back
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.required_spec_claims = HashSet::new();

    decode::<AccessTokenClaims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            jsonwebtoken::errors::ErrorKind::Json(err) => {
                TokenError::malformed(format!("claims do not parse: {err}"))
            }
            other => TokenError::malformed(format!("{other:?}")),
        })
}
