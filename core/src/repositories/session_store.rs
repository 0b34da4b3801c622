//! Storage contract for sessions, past tokens, signing keys, and named
//! key-value entries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::entities::{
    KeyKind, KeyValueRecord, PastTokenRecord, SessionRecord, SigningKeyRecord,
};
use crate::errors::StoreResult;

/// Contract every session backend implements.
///
/// Transactional backends (SQL) typically implement the conditional writes
/// with short transactions; copy-on-write backends (document or KV stores)
/// implement them with compare-and-swap on a version counter. Either way the
/// core only ever sees the same three primitives: plain reads/writes,
/// conditional update, and insert-if-absent.
///
/// # Security Considerations
/// - Refresh token columns hold double hashes, never raw tokens
/// - Signing-key private halves are stored as opaque strings; encrypting
///   them at rest is the backend's concern
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a freshly created session row.
    ///
    /// # Errors
    /// Fails with a query error if the handle already exists; handles are
    /// UUIDs so a collision means caller error, not bad luck.
    async fn create_session(&self, session: SessionRecord) -> StoreResult<()>;

    /// Fetch a session row by handle.
    ///
    /// # Example
    /// ```no_run
    /// # use portcullis_core::repositories::SessionStore;
    /// # async fn example(store: &impl SessionStore) -> Result<(), Box<dyn std::error::Error>> {
    /// match store.get_session("some-handle").await? {
    ///     Some(session) => println!("belongs to {}", session.user_id),
    ///     None => println!("no such session"),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    async fn get_session(&self, session_handle: &str) -> StoreResult<Option<SessionRecord>>;

    /// Number of session rows currently stored, expired or not
    async fn get_session_count(&self) -> StoreResult<u64>;

    /// Handles of every session belonging to a user
    async fn get_session_handles_for_user(&self, user_id: &str) -> StoreResult<Vec<String>>;

    /// Conditionally swap the current refresh token of a session.
    ///
    /// The update lands only if the stored hash still equals
    /// `expected_hash2`; the session expiry is bumped to `new_expires_at` in
    /// the same write. Under concurrent rotation exactly one caller observes
    /// `true`.
    ///
    /// # Returns
    /// * `Ok(true)` - This caller won; the row now holds `new_hash2`
    /// * `Ok(false)` - The stored hash had already moved on (or the session
    ///   does not exist)
    async fn update_refresh_token_hash(
        &self,
        session_handle: &str,
        expected_hash2: &str,
        new_hash2: &str,
        new_expires_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Partially update the JSON blobs of a session.
    ///
    /// A `None` field is left untouched. Returns `false` when the session
    /// does not exist.
    async fn update_session_data(
        &self,
        session_handle: &str,
        user_data_in_database: Option<Value>,
        user_data_in_jwt: Option<Value>,
    ) -> StoreResult<bool>;

    /// Delete the given sessions, returning the handles that actually
    /// existed. Unknown handles are skipped, not errors.
    async fn delete_sessions(&self, session_handles: &[String]) -> StoreResult<Vec<String>>;

    /// Delete every session whose expiry is at or before `now`, returning
    /// the number removed
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Record a minted refresh token in the audit trail
    async fn insert_past_token(&self, record: PastTokenRecord) -> StoreResult<()>;

    /// Look up a past-token row by the stored (double) hash
    async fn get_past_token(&self, refresh_token_hash2: &str)
        -> StoreResult<Option<PastTokenRecord>>;

    /// Number of past-token rows currently stored
    async fn count_past_tokens(&self) -> StoreResult<u64>;

    /// Delete past-token rows older than `created_before` whose session no
    /// longer exists, returning the number removed.
    ///
    /// Rows belonging to live sessions are always kept, whatever their age;
    /// the rotation race checks depend on them.
    async fn delete_orphaned_past_tokens(&self, created_before: DateTime<Utc>) -> StoreResult<u64>;

    /// All signing keys of a kind, newest first
    async fn get_signing_keys(&self, kind: KeyKind) -> StoreResult<Vec<SigningKeyRecord>>;

    /// Insert a signing key unless one already exists for the same
    /// `(kind, bucket)`, and return the row that won.
    ///
    /// This is the primitive that makes lazy key creation exactly-once:
    /// concurrent callers all get the same winning record back, whichever of
    /// them inserted it.
    ///
    /// # Example
    /// ```no_run
    /// # use portcullis_core::repositories::SessionStore;
    /// # use portcullis_core::domain::entities::SigningKeyRecord;
    /// # async fn example(store: &impl SessionStore, fresh: SigningKeyRecord) -> Result<(), Box<dyn std::error::Error>> {
    /// let winner = store.insert_signing_key_if_absent(fresh.clone()).await?;
    /// if winner.key_id != fresh.key_id {
    ///     println!("another replica created the key first");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    async fn insert_signing_key_if_absent(
        &self,
        record: SigningKeyRecord,
    ) -> StoreResult<SigningKeyRecord>;

    /// Fetch a named key-value entry
    async fn get_key_value(&self, name: &str) -> StoreResult<Option<KeyValueRecord>>;

    /// Insert a named key-value entry unless the name is already taken, and
    /// return the row that won
    async fn set_key_value_if_absent(&self, record: KeyValueRecord) -> StoreResult<KeyValueRecord>;

    /// Whether a session row exists for the handle
    async fn session_exists(&self, session_handle: &str) -> StoreResult<bool> {
        Ok(self.get_session(session_handle).await?.is_some())
    }
}
