//! Opaque refresh token codec.
//!
//! A refresh token on the wire is `<base64(ciphertext)>.<base64(nonce)>.V1`:
//! the JSON payload sealed with AES-256-GCM under a master key that lives in
//! the store and is created lazily on first use. GCM authentication means a
//! token that decrypts is known to have been minted here.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Duration;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::OnceCell;

use portcullis_shared::clock::Clock;

use crate::domain::entities::{
    KeyValueRecord, RefreshTokenPayload, TokenBundle, REFRESH_TOKEN_WIRE_VERSION,
};
use crate::errors::{SessionError, SessionResult, StoreError, StoreResult, TokenError};
use crate::repositories::SessionStore;

/// Store row name for the encryption master key
const MASTER_KEY_NAME: &str = "refresh_token_master_key";

/// Seals and opens opaque refresh tokens.
pub struct RefreshTokenCodec<S: SessionStore> {
    store: Arc<S>,
    validity: Duration,
    clock: Arc<dyn Clock>,
    /// Cached master key; the store row stays authoritative across processes
    master_key: OnceCell<[u8; 32]>,
}

impl<S: SessionStore> RefreshTokenCodec<S> {
    pub fn new(store: Arc<S>, validity: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            validity,
            clock,
            master_key: OnceCell::new(),
        }
    }

    /// Mint a fresh refresh token for a session.
    ///
    /// `parent_refresh_token_hash2` is the stored-form hash of the token
    /// being rotated away, or `None` at session creation.
    pub async fn create(
        &self,
        session_handle: &str,
        parent_refresh_token_hash2: Option<String>,
        generation: u64,
        anti_csrf_token: Option<String>,
    ) -> SessionResult<(TokenBundle, RefreshTokenPayload)> {
        let now_millis = self.clock.now_millis();
        let expiry_time = now_millis + self.validity.num_milliseconds();

        let payload = RefreshTokenPayload {
            session_handle: session_handle.to_string(),
            parent_refresh_token_hash2,
            generation,
            anti_csrf_token,
            expiry_time,
        };
        let plaintext = serde_json::to_vec(&payload)
            .map_err(|e| SessionError::crypto(format!("refresh payload failed to serialize: {e}")))?;

        let key = self.master_key().await?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| SessionError::crypto("refresh token encryption failed"))?;

        let token = format!(
            "{}.{}.{}",
            STANDARD.encode(&ciphertext),
            STANDARD.encode(nonce_bytes),
            REFRESH_TOKEN_WIRE_VERSION
        );
        Ok((TokenBundle::new(token, expiry_time, now_millis), payload))
    }

    /// Open a refresh token back into its payload.
    ///
    /// Structural problems (wrong part count, bad base64, unknown version
    /// tag) are reported distinctly from a well-formed token that fails
    /// authentication, because callers answer the two differently.
    pub async fn decode(&self, token: &str) -> Result<RefreshTokenPayload, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(TokenError::malformed(
                "expected <ciphertext>.<nonce>.<version>",
            ));
        }
        if parts[2] != REFRESH_TOKEN_WIRE_VERSION {
            return Err(TokenError::WrongVersion {
                found: parts[2].to_string(),
            });
        }

        let ciphertext = STANDARD
            .decode(parts[0])
            .map_err(|_| TokenError::malformed("ciphertext is not valid base64"))?;
        let nonce = STANDARD
            .decode(parts[1])
            .map_err(|_| TokenError::malformed("nonce is not valid base64"))?;
        if nonce.len() != 12 {
            return Err(TokenError::malformed("nonce must be 12 bytes"));
        }

        let key = self.master_key().await?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| TokenError::Decrypt)?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| TokenError::malformed(format!("payload does not parse: {e}")))
    }

    /// The master key, fetched or lazily created through the store's
    /// insert-if-absent so every process converges on the same key.
    async fn master_key(&self) -> StoreResult<&[u8; 32]> {
        self.master_key
            .get_or_try_init(|| async {
                let row = match self.store.get_key_value(MASTER_KEY_NAME).await? {
                    Some(row) => row,
                    None => {
                        let mut fresh = [0u8; 32];
                        OsRng.fill_bytes(&mut fresh);
                        self.store
                            .set_key_value_if_absent(KeyValueRecord {
                                name: MASTER_KEY_NAME.to_string(),
                                value: STANDARD.encode(fresh),
                                created_at: self.clock.now(),
                            })
                            .await?
                    }
                };

                let bytes = STANDARD.decode(&row.value).map_err(|e| {
                    StoreError::row_decode(format!("master key row is not valid base64: {e}"))
                })?;
                bytes
                    .try_into()
                    .map_err(|_| StoreError::row_decode("master key row must decode to 32 bytes"))
            })
            .await
    }
}
