//! In-memory `SessionStore` used by the core's own tests and handy as a
//! stand-in for embedders that do not want a real database in unit tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::entities::{
    KeyKind, KeyValueRecord, PastTokenRecord, SessionRecord, SigningKeyRecord,
};
use crate::errors::{StoreError, StoreResult};
use crate::repositories::session_store::SessionStore;

#[derive(Default)]
struct MockState {
    sessions: HashMap<String, SessionRecord>,
    past_tokens: HashMap<String, PastTokenRecord>,
    signing_keys: Vec<SigningKeyRecord>,
    key_values: HashMap<String, KeyValueRecord>,
}

/// Mock session store backed by maps behind a single lock.
///
/// Every operation takes the lock for its whole duration, so conditional
/// writes are linearizable the same way they are against a real backend.
#[derive(Default)]
pub struct MockSessionStore {
    state: RwLock<MockState>,
}

impl MockSessionStore {
    /// Create a new, empty mock store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn create_session(&self, session: SessionRecord) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.sessions.contains_key(&session.session_handle) {
            return Err(StoreError::query("session handle already exists"));
        }
        state
            .sessions
            .insert(session.session_handle.clone(), session);
        Ok(())
    }

    async fn get_session(&self, session_handle: &str) -> StoreResult<Option<SessionRecord>> {
        let state = self.state.read().await;
        Ok(state.sessions.get(session_handle).cloned())
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
            .filter(|s| s.user_id == user_id)
            .map(|s| s.session_handle.clone())
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
            Some(session) if session.refresh_token_hash2 == expected_hash2 => {
                session.refresh_token_hash2 = new_hash2.to_string();
                session.expires_at = new_expires_at;
                Ok(true)
            }
            _ => Ok(false),
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
            Some(session) => {
                if let Some(data) = user_data_in_database {
                    session.user_data_in_database = data;
                }
                if let Some(data) = user_data_in_jwt {
                    session.user_data_in_jwt = data;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_sessions(&self, session_handles: &[String]) -> StoreResult<Vec<String>> {
        let mut state = self.state.write().await;
        let mut removed = Vec::new();
        for handle in session_handles {
            if state.sessions.remove(handle).is_some() {
                removed.push(handle.clone());
            }
        }
        Ok(removed)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, session| !session.is_expired(now));
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

    async fn delete_orphaned_past_tokens(&self, created_before: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let live: HashSet<String> = state.sessions.keys().cloned().collect();
        let before = state.past_tokens.len();
        state.past_tokens.retain(|_, record| {
            live.contains(&record.session_handle) || record.created_at > created_before
        });
        Ok((before - state.past_tokens.len()) as u64)
    }

    async fn get_signing_keys(&self, kind: KeyKind) -> StoreResult<Vec<SigningKeyRecord>> {
        let state = self.state.read().await;
        let mut keys: Vec<SigningKeyRecord> = state
            .signing_keys
            .iter()
            .filter(|k| k.kind == kind)
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
            .find(|k| k.kind == record.kind && k.bucket == record.bucket)
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
