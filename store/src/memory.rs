//! In-memory implementation of the `SessionStore` trait.
//!
//! The reference optimistic backend, written the way a copy-on-write
//! document store behaves: every session row carries a generation counter,
//! conditional writes compare the stored value and bump the generation, and
//! nothing ever surfaces a retryable transaction conflict. Useful for
//! embedders that want sessions without a database, and for exercising the
//! core against the optimistic concurrency family.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use portcullis_core::domain::entities::{
    KeyKind, KeyValueRecord, PastTokenRecord, SessionRecord, SigningKeyRecord,
};
use portcullis_core::errors::{StoreError, StoreResult};
use portcullis_core::repositories::SessionStore;

/// A session row plus the write-generation marker conditional updates check
/// and bump
struct VersionedSession {
    generation: u64,
    record: SessionRecord,
}

impl VersionedSession {
    fn new(record: SessionRecord) -> Self {
        Self {
            generation: 0,
            record,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<String, VersionedSession>,
    past_tokens: HashMap<String, PastTokenRecord>,
    signing_keys: Vec<SigningKeyRecord>,
    key_values: HashMap<String, KeyValueRecord>,
}

/// Process-local session store backed by hash maps.
#[derive(Default)]
pub struct MemorySessionStore {
    state: RwLock<MemoryState>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: SessionRecord) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.sessions.contains_key(&session.session_handle) {
            return Err(StoreError::query(format!(
                "session handle already exists: {}",
                session.session_handle
            )));
        }
        state
            .sessions
            .insert(session.session_handle.clone(), VersionedSession::new(session));
        Ok(())
    }

    async fn get_session(&self, session_handle: &str) -> StoreResult<Option<SessionRecord>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .get(session_handle)
            .map(|versioned| versioned.record.clone()))
    }

    async fn get_session_count(&self) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state.sessions.len() as u64)
    }

    async fn get_session_handles_for_user(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .filter(|versioned| versioned.record.user_id == user_id)
            .map(|versioned| versioned.record.session_handle.clone())
            .collect())
    }

    async fn update_refresh_token_hash(
        &self,
        session_handle: &str,
        expected_hash2: &str,
        new_hash2: &str,
        new_expires_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        match state.sessions.get_mut(session_handle) {
            Some(versioned) if versioned.record.refresh_token_hash2 == expected_hash2 => {
                versioned.record.refresh_token_hash2 = new_hash2.to_string();
                versioned.record.expires_at = new_expires_at;
                versioned.generation += 1;
                Ok(true)
            }
            Some(versioned) => {
                debug!(
                    session_handle,
                    generation = versioned.generation,
                    "conditional hash swap lost"
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn update_session_data(
        &self,
        session_handle: &str,
        user_data_in_database: Option<Value>,
        user_data_in_jwt: Option<Value>,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        match state.sessions.get_mut(session_handle) {
            Some(versioned) => {
                if let Some(db_data) = user_data_in_database {
                    versioned.record.user_data_in_database = db_data;
                }
                if let Some(jwt_data) = user_data_in_jwt {
                    versioned.record.user_data_in_jwt = jwt_data;
                }
                versioned.generation += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_sessions(&self, session_handles: &[String]) -> StoreResult<Vec<String>> {
        let mut state = self.state.write().await;
        let mut deleted = Vec::new();
        for handle in session_handles {
            if state.sessions.remove(handle).is_some() {
                deleted.push(handle.clone());
            }
        }
        Ok(deleted)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state
            .sessions
            .retain(|_, versioned| versioned.record.expires_at > now);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn insert_past_token(&self, record: PastTokenRecord) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .past_tokens
            .insert(record.refresh_token_hash2.clone(), record);
        Ok(())
    }

    async fn get_past_token(
        &self,
        refresh_token_hash2: &str,
    ) -> StoreResult<Option<PastTokenRecord>> {
        let state = self.state.read().await;
        Ok(state.past_tokens.get(refresh_token_hash2).cloned())
    }

    async fn count_past_tokens(&self) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state.past_tokens.len() as u64)
    }

    async fn delete_orphaned_past_tokens(
        &self,
        created_before: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let state = &mut *state;
        let sessions = &state.sessions;
        let before = state.past_tokens.len();
        state.past_tokens.retain(|_, record| {
            sessions.contains_key(&record.session_handle) || record.created_at > created_before
        });
        Ok((before - state.past_tokens.len()) as u64)
    }

    async fn get_signing_keys(&self, kind: KeyKind) -> StoreResult<Vec<SigningKeyRecord>> {
        let state = self.state.read().await;
        let mut keys: Vec<SigningKeyRecord> = state
            .signing_keys
            .iter()
            .filter(|key| key.kind == kind)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn insert_signing_key_if_absent(
        &self,
        record: SigningKeyRecord,
    ) -> StoreResult<SigningKeyRecord> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .signing_keys
            .iter()
            .find(|key| key.kind == record.kind && key.bucket == record.bucket)
        {
            return Ok(existing.clone());
        }
        state.signing_keys.push(record.clone());
        Ok(record)
    }

    async fn get_key_value(&self, name: &str) -> StoreResult<Option<KeyValueRecord>> {
        let state = self.state.read().await;
        Ok(state.key_values.get(name).cloned())
    }

    async fn set_key_value_if_absent(&self, record: KeyValueRecord) -> StoreResult<KeyValueRecord> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.key_values.get(&record.name) {
            return Ok(existing.clone());
        }
        state.key_values.insert(record.name.clone(), record.clone());
        Ok(record)
    }
}
