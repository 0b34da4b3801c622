//! Session lifecycle with rotating refresh tokens.
//!
//! A session is anchored by a database row keyed on a random handle. The
//! client holds three artifacts: a signed access token (stateless proof), an
//! opaque refresh token (rotated on every use), and an id-refresh token
//! (a plain marker whose presence tells a frontend "a session exists").
//!
//! Refresh tokens rotate eagerly: a refresh mints the successor token and
//! publishes it with a single conditional write on the session row. The chain
//! of successors is remembered in past-token rows, which is how a replayed
//! token is told apart from a stolen one.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use portcullis_shared::clock::Clock;

use crate::domain::entities::{
    PastTokenRecord, PublicSigningKey, RefreshTokenPayload, SessionRecord, TokenBundle,
    TokenVersion,
};
use crate::domain::value_objects::{
    CreatedSession, RefreshedSession, RegeneratedSession, SessionSummary, VerifiedSession,
};
use crate::errors::{SessionError, SessionResult, StoreResult, TokenError};
use crate::repositories::{Atomic, AtomicRunner, SessionStore};
use crate::services::signing_key::SigningKeyStore;
use crate::services::token::{
    anti_csrf_matches, generate_anti_csrf_token, AccessTokenCodec, AccessTokenInput,
    RefreshTokenCodec,
};
use crate::utils::hash_token_twice;

use super::config::SessionServiceConfig;

/// Everything that goes into a new session.
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    /// Owner of the session
    pub user_id: String,
    /// Claims embedded in every access token
    pub user_data_in_jwt: Value,
    /// Server-side data stored on the session row only
    pub user_data_in_database: Value,
    /// Bind an anti-CSRF token into the session's tokens
    pub enable_anti_csrf: bool,
    /// Signature scheme for the access token
    pub token_version: TokenVersion,
    /// Sign with the non-rotating static key instead of the current
    /// dynamic one
    pub use_static_signing_key: bool,
}

impl CreateSessionParams {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_data_in_jwt: Value::Object(serde_json::Map::new()),
            user_data_in_database: Value::Object(serde_json::Map::new()),
            enable_anti_csrf: false,
            token_version: TokenVersion::V2,
            use_static_signing_key: false,
        }
    }

    pub fn with_jwt_data(mut self, data: Value) -> Self {
        self.user_data_in_jwt = data;
        self
    }

    pub fn with_database_data(mut self, data: Value) -> Self {
        self.user_data_in_database = data;
        self
    }

    pub fn with_anti_csrf(mut self, enabled: bool) -> Self {
        self.enable_anti_csrf = enabled;
        self
    }

    pub fn with_token_version(mut self, version: TokenVersion) -> Self {
        self.token_version = version;
        self
    }

    pub fn with_static_signing_key(mut self, use_static: bool) -> Self {
        self.use_static_signing_key = use_static;
        self
    }
}

/// Service for creating, verifying, refreshing, and revoking sessions.
///
/// Generic over the [`SessionStore`] so the same logic runs against SQLite,
/// an in-memory store, or anything else implementing the trait.
pub struct SessionService<S: SessionStore> {
    store: Arc<S>,
    signing_keys: Arc<SigningKeyStore<S>>,
    access_tokens: AccessTokenCodec<S>,
    refresh_tokens: RefreshTokenCodec<S>,
    runner: AtomicRunner,
    clock: Arc<dyn Clock>,
    config: SessionServiceConfig,
}

impl<S: SessionStore> SessionService<S> {
    /// Create a new session service
    ///
    /// # Arguments
    ///
    /// * `store` - Persistence for sessions, past tokens, and signing keys
    /// * `config` - Validities, rotation windows, and retry budget
    /// * `clock` - Time source; injectable so tests can steer it
    pub fn new(store: Arc<S>, config: SessionServiceConfig, clock: Arc<dyn Clock>) -> Self {
        let signing_keys = Arc::new(SigningKeyStore::new(
            store.clone(),
            config.keys.clone(),
            clock.clone(),
        ));
        let access_tokens = AccessTokenCodec::new(
            signing_keys.clone(),
            config.session.access_token_validity(),
            config.session.legacy_signing_secret.clone(),
            clock.clone(),
        );
        let refresh_tokens = RefreshTokenCodec::new(
            store.clone(),
            config.session.refresh_token_validity(),
            clock.clone(),
        );
        let runner = AtomicRunner::new(config.max_atomic_attempts);

        Self {
            store,
            signing_keys,
            access_tokens,
            refresh_tokens,
            runner,
            clock,
            config,
        }
    }

    /// The signing-key manager backing this service, for publishing
    /// verification keys or warming the cache at startup
    pub fn signing_keys(&self) -> &SigningKeyStore<S> {
        &self.signing_keys
    }

    /// Create a new session and mint its first set of tokens.
    ///
    /// Writes the session row and the origin entry of its refresh-token
    /// chain, then returns the access token, refresh token, id-refresh
    /// token, and (when enabled) the anti-CSRF value the client must echo.
    pub async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> SessionResult<CreatedSession> {
        let now = self.clock.now();
        let session_handle = Uuid::new_v4().to_string();
        let anti_csrf_token = params.enable_anti_csrf.then(generate_anti_csrf_token);

        let (refresh_token, _) = self
            .refresh_tokens
            .create(&session_handle, None, 0, anti_csrf_token.clone())
            .await?;
        let refresh_hash2 = hash_token_twice(&refresh_token.token);

        self.store
            .create_session(SessionRecord {
                session_handle: session_handle.clone(),
                user_id: params.user_id.clone(),
                refresh_token_hash2: refresh_hash2.clone(),
                user_data_in_database: params.user_data_in_database,
                user_data_in_jwt: params.user_data_in_jwt.clone(),
                created_at: now,
                expires_at: now + self.config.session.refresh_token_validity(),
            })
            .await?;
        // The chain origin points at itself; replays of the first token are
        // then classified exactly like any later generation.
        self.store
            .insert_past_token(PastTokenRecord {
                refresh_token_hash2: refresh_hash2.clone(),
                session_handle: session_handle.clone(),
                parent_refresh_token_hash2: refresh_hash2,
                created_at: now,
            })
            .await?;

        let (access_token, _) = self
            .access_tokens
            .create(
                params.token_version,
                params.use_static_signing_key,
                AccessTokenInput {
                    session_handle: session_handle.clone(),
                    user_id: params.user_id.clone(),
                    user_data: params.user_data_in_jwt.clone(),
                    anti_csrf_token: anti_csrf_token.clone(),
                    lmrt: self.clock.now_millis(),
                    expiry_override: None,
                },
            )
            .await?;
        let id_refresh_token = self.mint_id_refresh_token(&refresh_token);

        info!(
            session_handle = %session_handle,
            user_id = %params.user_id,
            "session created"
        );

        Ok(CreatedSession {
            session: SessionSummary {
                handle: session_handle,
                user_id: params.user_id,
                user_data_in_jwt: params.user_data_in_jwt,
            },
            access_token,
            refresh_token,
            id_refresh_token,
            anti_csrf_token,
        })
    }

    /// Verify an access token and return the session it proves.
    ///
    /// The fast path is entirely stateless: signature, expiry, and the
    /// anti-CSRF binding are checked without touching the store. The session
    /// row is consulted only when `check_database` asks for a revocation
    /// check, or when the token was signed by a superseded key and must be
    /// re-signed under the current one.
    ///
    /// # Arguments
    ///
    /// * `access_token` - The raw token from the request
    /// * `anti_csrf_token` - The anti-CSRF value presented alongside it
    /// * `do_anti_csrf_check` - Enforce the anti-CSRF binding; skipped for
    ///   request styles that cannot carry the header
    /// * `check_database` - Confirm the session row still exists
    ///
    /// # Returns
    ///
    /// [`SessionError::TryRefreshToken`] when the token is expired or
    /// otherwise unverifiable but a refresh could recover the session;
    /// [`SessionError::Unauthorised`] when the anti-CSRF check or the
    /// revocation check fails.
    pub async fn get_session(
        &self,
        access_token: &str,
        anti_csrf_token: Option<&str>,
        do_anti_csrf_check: bool,
        check_database: bool,
    ) -> SessionResult<VerifiedSession> {
        let verified = match self.access_tokens.verify(access_token).await {
            Ok(verified) => verified,
            Err(TokenError::Store(err)) => return Err(SessionError::Storage(err)),
            Err(err) => {
                debug!(error = %err, "access token rejected");
                return Err(SessionError::try_refresh(err.to_string()));
            }
        };
        let claims = verified.claims;

        if do_anti_csrf_check {
            // Sessions created without anti-CSRF carry no bound value and
            // pass vacuously.
            if let Some(expected) = claims.anti_csrf_token.as_deref() {
                if !anti_csrf_matches(expected, anti_csrf_token) {
                    warn!(session_handle = %claims.session_handle, "anti-csrf token mismatch");
                    return Err(SessionError::try_refresh(
                        "anti-csrf token missing or mismatched",
                    ));
                }
            }
        }

        if !check_database && !verified.key_superseded {
            return Ok(VerifiedSession {
                session: SessionSummary::from(&claims),
                access_token: None,
            });
        }

        // Existence is the only thing checked here; session expiry already
        // rode in on the access token's own expiry.
        if self.store.get_session(&claims.session_handle).await?.is_none() {
            debug!(session_handle = %claims.session_handle, "session row gone, token revoked");
            return Err(SessionError::unauthorised("session does not exist"));
        }

        let access_token = if verified.key_superseded {
            let (bundle, _) = self
                .access_tokens
                .create(
                    claims.ver,
                    false,
                    AccessTokenInput {
                        session_handle: claims.session_handle.clone(),
                        user_id: claims.user_id.clone(),
                        user_data: claims.user_data.clone(),
                        anti_csrf_token: claims.anti_csrf_token.clone(),
                        lmrt: claims.lmrt,
                        expiry_override: Some(claims.expiry_time),
                    },
                )
                .await?;
            info!(
                session_handle = %claims.session_handle,
                "access token re-signed under the current key"
            );
            Some(bundle)
        } else {
            None
        };

        Ok(VerifiedSession {
            session: SessionSummary::from(&claims),
            access_token,
        })
    }

    /// Exchange a refresh token for a fresh set of session tokens.
    ///
    /// The presented token is classified against the session's chain:
    ///
    /// * the current token rotates normally,
    /// * an unconfirmed child (its rotation response never arrived) is
    ///   promoted and then rotated,
    /// * the immediate parent of the current token, replayed within the
    ///   race window, gets a parallel child so racing devices all end up
    ///   with a working token,
    /// * anything else is treated as theft and rejected.
    ///
    /// Concurrent refreshes of the same session are serialised by a
    /// conditional write on the session row and retried here.
    ///
    /// # Arguments
    ///
    /// * `refresh_token` - The raw opaque token from the request
    /// * `anti_csrf_token` - The anti-CSRF value presented alongside it
    /// * `enable_anti_csrf` - Enforce the binding carried in the token
    /// * `token_version` - Signature scheme for the new access token
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        anti_csrf_token: Option<&str>,
        enable_anti_csrf: bool,
        token_version: TokenVersion,
    ) -> SessionResult<RefreshedSession> {
        let payload = match self.refresh_tokens.decode(refresh_token).await {
            Ok(payload) => payload,
            Err(TokenError::Store(err)) => return Err(SessionError::Storage(err)),
            Err(TokenError::WrongVersion { found }) => {
                return Err(SessionError::invalid_refresh_format(format!(
                    "unrecognised refresh token version {found}"
                )));
            }
            Err(TokenError::Malformed { reason }) => {
                return Err(SessionError::invalid_refresh_format(reason));
            }
            Err(err) => {
                debug!(error = %err, "refresh token rejected");
                return Err(SessionError::unauthorised("refresh token cannot be read"));
            }
        };

        if enable_anti_csrf {
            let bound = match payload.anti_csrf_token.as_deref() {
                Some(expected) => anti_csrf_matches(expected, anti_csrf_token),
                None => false,
            };
            if !bound {
                warn!(session_handle = %payload.session_handle, "anti-csrf token mismatch on refresh");
                return Err(SessionError::unauthorised(
                    "anti-csrf token missing or mismatched",
                ));
            }
        }

        let presented_hash2 = hash_token_twice(refresh_token);
        let outcome = self
            .runner
            .run(|_| {
                Box::pin(self.refresh_attempt(
                    &payload,
                    &presented_hash2,
                    enable_anti_csrf,
                    token_version,
                ))
            })
            .await?;
        outcome
    }

    /// One classification pass of the rotation loop. Storage errors bubble
    /// out for the runner to retry; terminal rejections commit as values.
    async fn refresh_attempt(
        &self,
        payload: &RefreshTokenPayload,
        presented_hash2: &str,
        enable_anti_csrf: bool,
        token_version: TokenVersion,
    ) -> StoreResult<Atomic<SessionResult<RefreshedSession>>> {
        let now = self.clock.now();

        let Some(session) = self.store.get_session(&payload.session_handle).await? else {
            return commit_err(SessionError::unauthorised("session does not exist"));
        };
        if session.is_expired(now) {
            return commit_err(SessionError::unauthorised("session expired"));
        }

        if session.refresh_token_hash2 == presented_hash2 {
            // Current token: mint the successor and publish it with a
            // conditional write. Losing the write means another refresh got
            // there first; re-read and reclassify.
            let anti_csrf_token = enable_anti_csrf.then(generate_anti_csrf_token);
            let (new_refresh, _) = match self
                .refresh_tokens
                .create(
                    &session.session_handle,
                    Some(presented_hash2.to_string()),
                    payload.generation + 1,
                    anti_csrf_token.clone(),
                )
                .await
            {
                Ok(minted) => minted,
                Err(err) => return commit_err(err),
            };
            let new_hash2 = hash_token_twice(&new_refresh.token);

            let swapped = self
                .store
                .update_refresh_token_hash(
                    &session.session_handle,
                    presented_hash2,
                    &new_hash2,
                    now + self.config.session.refresh_token_validity(),
                )
                .await?;
            if !swapped {
                debug!(
                    session_handle = %session.session_handle,
                    "lost the rotation race, reclassifying"
                );
                return Ok(Atomic::Retry);
            }

            self.store
                .insert_past_token(PastTokenRecord {
                    refresh_token_hash2: new_hash2,
                    session_handle: session.session_handle.clone(),
                    parent_refresh_token_hash2: presented_hash2.to_string(),
                    created_at: now,
                })
                .await?;

            let finished = self
                .finish_refresh(&session, new_refresh, anti_csrf_token, token_version)
                .await;
            return Ok(Atomic::Commit(finished));
        }

        if payload.parent_refresh_token_hash2.as_deref() == Some(session.refresh_token_hash2.as_str())
        {
            // The presented token is a child whose rotation response never
            // reached the client, so the client kept using it while the row
            // still names its parent. Promote it to current; the next pass
            // rotates it normally.
            let promoted = self
                .store
                .update_refresh_token_hash(
                    &session.session_handle,
                    &session.refresh_token_hash2,
                    presented_hash2,
                    now + self.config.session.refresh_token_validity(),
                )
                .await?;
            debug!(
                session_handle = %session.session_handle,
                promoted,
                "promoting unconfirmed child token"
            );
            return Ok(Atomic::Retry);
        }

        if let Some(current) = self.store.get_past_token(&session.refresh_token_hash2).await? {
            let age = now.signed_duration_since(current.created_at);
            if current.parent_refresh_token_hash2 == presented_hash2
                && age <= self.config.session.rotation_race_window()
            {
                // Two devices raced on the same token moments ago and the
                // loser is replaying it. Hand it a parallel child of the
                // current token instead of calling it theft; no conditional
                // write, the winner's token stays current.
                let anti_csrf_token = enable_anti_csrf.then(generate_anti_csrf_token);
                let (sibling, _) = match self
                    .refresh_tokens
                    .create(
                        &session.session_handle,
                        Some(session.refresh_token_hash2.clone()),
                        payload.generation + 1,
                        anti_csrf_token.clone(),
                    )
                    .await
                {
                    Ok(minted) => minted,
                    Err(err) => return commit_err(err),
                };
                self.store
                    .insert_past_token(PastTokenRecord {
                        refresh_token_hash2: hash_token_twice(&sibling.token),
                        session_handle: session.session_handle.clone(),
                        parent_refresh_token_hash2: session.refresh_token_hash2.clone(),
                        created_at: now,
                    })
                    .await?;

                info!(
                    session_handle = %session.session_handle,
                    "refresh race within the window, issued a parallel token"
                );
                let finished = self
                    .finish_refresh(&session, sibling, anti_csrf_token, token_version)
                    .await;
                return Ok(Atomic::Commit(finished));
            }
        }

        warn!(
            session_handle = %payload.session_handle,
            "refresh token is not in the session's chain; possible token theft"
        );
        commit_err(SessionError::unauthorised("refresh token not found"))
    }

    /// Mint the access and id-refresh tokens that ride along with a freshly
    /// rotated refresh token
    async fn finish_refresh(
        &self,
        session: &SessionRecord,
        refresh_token: TokenBundle,
        anti_csrf_token: Option<String>,
        token_version: TokenVersion,
    ) -> SessionResult<RefreshedSession> {
        let (access_token, _) = self
            .access_tokens
            .create(
                token_version,
                false,
                AccessTokenInput {
                    session_handle: session.session_handle.clone(),
                    user_id: session.user_id.clone(),
                    user_data: session.user_data_in_jwt.clone(),
                    anti_csrf_token: anti_csrf_token.clone(),
                    lmrt: self.clock.now_millis(),
                    expiry_override: None,
                },
            )
            .await?;
        let id_refresh_token = self.mint_id_refresh_token(&refresh_token);

        info!(session_handle = %session.session_handle, "session refreshed");
        Ok(RefreshedSession {
            session: SessionSummary::from(session),
            access_token,
            refresh_token,
            id_refresh_token,
            anti_csrf_token,
        })
    }

    /// Re-issue an access token with updated claims, without rotating the
    /// refresh token.
    ///
    /// Expiry is tolerated on the way in: the session row is updated either
    /// way, and an already-expired token simply comes back as `None` so the
    /// claims take effect on the next refresh.
    pub async fn regenerate_token(
        &self,
        access_token: &str,
        user_data_in_jwt: Option<Value>,
    ) -> SessionResult<RegeneratedSession> {
        let verified = match self.access_tokens.verify_ignoring_expiry(access_token).await {
            Ok(verified) => verified,
            Err(TokenError::Store(err)) => return Err(SessionError::Storage(err)),
            Err(err) => {
                debug!(error = %err, "token presented for regeneration rejected");
                return Err(SessionError::try_refresh(err.to_string()));
            }
        };
        let claims = verified.claims;

        let session = self
            .store
            .get_session(&claims.session_handle)
            .await?
            .ok_or_else(|| SessionError::unauthorised("session does not exist"))?;

        if let Some(data) = &user_data_in_jwt {
            self.store
                .update_session_data(&claims.session_handle, None, Some(data.clone()))
                .await?;
        }
        let final_jwt_data = user_data_in_jwt.unwrap_or(session.user_data_in_jwt);

        let now_millis = self.clock.now_millis();
        // Strictly advances even when two regenerations land in the same
        // millisecond, so token recency stays totally ordered.
        let lmrt = now_millis.max(claims.lmrt + 1);

        let access_token = if claims.is_expired(now_millis) {
            debug!(
                session_handle = %claims.session_handle,
                "token already expired; claims updated without re-issue"
            );
            None
        } else {
            let (bundle, _) = self
                .access_tokens
                .create(
                    claims.ver,
                    false,
                    AccessTokenInput {
                        session_handle: claims.session_handle.clone(),
                        user_id: claims.user_id.clone(),
                        user_data: final_jwt_data.clone(),
                        anti_csrf_token: claims.anti_csrf_token.clone(),
                        lmrt,
                        expiry_override: Some(claims.expiry_time),
                    },
                )
                .await?;
            Some(bundle)
        };

        info!(session_handle = %claims.session_handle, "session claims regenerated");
        Ok(RegeneratedSession {
            session: SessionSummary {
                handle: claims.session_handle,
                user_id: claims.user_id,
                user_data_in_jwt: final_jwt_data,
            },
            access_token,
        })
    }

    /// Revoke the given sessions, returning the handles that actually
    /// existed. Unknown handles are skipped rather than reported as errors.
    pub async fn revoke_sessions(&self, session_handles: &[String]) -> SessionResult<Vec<String>> {
        let revoked = self.store.delete_sessions(session_handles).await?;
        if !revoked.is_empty() {
            info!(count = revoked.len(), "sessions revoked");
        }
        Ok(revoked)
    }

    /// Revoke every session belonging to a user, returning the revoked
    /// handles
    pub async fn revoke_all_sessions_for_user(&self, user_id: &str) -> SessionResult<Vec<String>> {
        let handles = self.store.get_session_handles_for_user(user_id).await?;
        self.revoke_sessions(&handles).await
    }

    /// All live session handles for a user
    pub async fn get_all_session_handles_for_user(
        &self,
        user_id: &str,
    ) -> SessionResult<Vec<String>> {
        Ok(self.store.get_session_handles_for_user(user_id).await?)
    }

    /// The full session row, including the server-side data blob
    pub async fn get_session_info(&self, session_handle: &str) -> SessionResult<SessionRecord> {
        self.store
            .get_session(session_handle)
            .await?
            .ok_or_else(|| SessionError::unauthorised("session does not exist"))
    }

    /// Replace the server-side data blob on a session row
    pub async fn update_session_data(
        &self,
        session_handle: &str,
        user_data_in_database: Value,
    ) -> SessionResult<()> {
        let updated = self
            .store
            .update_session_data(session_handle, Some(user_data_in_database), None)
            .await?;
        if !updated {
            return Err(SessionError::unauthorised("session does not exist"));
        }
        Ok(())
    }

    /// Number of live sessions across all users
    pub async fn get_session_count(&self) -> SessionResult<u64> {
        Ok(self.store.get_session_count().await?)
    }

    /// Public halves of every key that may still be verifying tokens,
    /// suitable for handing to external verifiers
    pub async fn public_verification_keys(&self) -> SessionResult<Vec<PublicSigningKey>> {
        Ok(self.signing_keys.public_verification_keys().await?)
    }

    fn mint_id_refresh_token(&self, refresh_token: &TokenBundle) -> TokenBundle {
        TokenBundle::new(
            Uuid::new_v4().to_string(),
            refresh_token.expiry,
            refresh_token.created_time,
        )
    }
}

/// Terminal rejection inside the rotation loop: committed as a value so the
/// runner stops retrying
fn commit_err<T>(err: SessionError) -> StoreResult<Atomic<SessionResult<T>>> {
    Ok(Atomic::Commit(Err(err)))
}
