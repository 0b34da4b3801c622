//! The store contract, exercised against both reference backends.
//!
//! Every check runs once against SQLite and once against the in-memory
//! store; the session core relies on the two families behaving identically
//! through this interface.

mod common;

use chrono::{Duration, Utc};
use serde_json::json;

use portcullis_core::domain::entities::{KeyKind, KeyValueRecord, SigningKeyRecord};
use portcullis_core::repositories::SessionStore;
use portcullis_store::{MemorySessionStore, SqliteSessionStore};

use common::{now_millis, past_token_record, session_record};

fn signing_key(kind: KeyKind, bucket: i64, created_at: chrono::DateTime<Utc>) -> SigningKeyRecord {
    SigningKeyRecord {
        key_id: format!("{}-{}", kind.as_str(), uuid::Uuid::new_v4()),
        kind,
        bucket,
        algorithm: "EdDSA".to_string(),
        public_key: "pub".to_string(),
        private_key: "priv".to_string(),
        created_at,
    }
}

async fn check_session_roundtrip<S: SessionStore>(store: &S) {
    let now = now_millis();
    let record = session_record("user-1", now);

    store.create_session(record.clone()).await.unwrap();

    let fetched = store.get_session(&record.session_handle).await.unwrap();
    assert_eq!(fetched, Some(record.clone()));
    assert_eq!(store.get_session_count().await.unwrap(), 1);
    assert!(store.session_exists(&record.session_handle).await.unwrap());
    assert!(!store.session_exists("ghost").await.unwrap());

    let handles = store.get_session_handles_for_user("user-1").await.unwrap();
    assert_eq!(handles, vec![record.session_handle.clone()]);
    assert!(store
        .get_session_handles_for_user("user-2")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_session_roundtrip_sqlite() {
    let store = SqliteSessionStore::in_memory().await.unwrap();
    check_session_roundtrip(&store).await;
}

#[tokio::test]
async fn test_session_roundtrip_memory() {
    check_session_roundtrip(&MemorySessionStore::new()).await;
}

async fn check_conditional_hash_swap<S: SessionStore>(store: &S) {
    let now = now_millis();
    let record = session_record("user-1", now);
    let original_hash = record.refresh_token_hash2.clone();
    store.create_session(record.clone()).await.unwrap();

    let new_expiry = now + Duration::days(200);

    // Mismatched expectation leaves the row untouched
    let swapped = store
        .update_refresh_token_hash(&record.session_handle, "not-current", "next", new_expiry)
        .await
        .unwrap();
    assert!(!swapped);
    let unchanged = store
        .get_session(&record.session_handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.refresh_token_hash2, original_hash);

    // Matching expectation swaps hash and expiry together
    let swapped = store
        .update_refresh_token_hash(&record.session_handle, &original_hash, "next", new_expiry)
        .await
        .unwrap();
    assert!(swapped);
    let updated = store
        .get_session(&record.session_handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.refresh_token_hash2, "next");
    assert_eq!(updated.expires_at, new_expiry);

    // The old expectation can never win again
    let swapped = store
        .update_refresh_token_hash(&record.session_handle, &original_hash, "other", new_expiry)
        .await
        .unwrap();
    assert!(!swapped);

    // Unknown session is a plain false, not an error
    let swapped = store
        .update_refresh_token_hash("ghost", "a", "b", new_expiry)
        .await
        .unwrap();
    assert!(!swapped);
}

#[tokio::test]
async fn test_conditional_hash_swap_sqlite() {
    let store = SqliteSessionStore::in_memory().await.unwrap();
    check_conditional_hash_swap(&store).await;
}

#[tokio::test]
async fn test_conditional_hash_swap_memory() {
    check_conditional_hash_swap(&MemorySessionStore::new()).await;
}

async fn check_partial_data_update<S: SessionStore>(store: &S) {
    let record = session_record("user-1", now_millis());
    store.create_session(record.clone()).await.unwrap();

    // Database blob only; JWT blob untouched
    let updated = store
        .update_session_data(&record.session_handle, Some(json!({"plan": "pro"})), None)
        .await
        .unwrap();
    assert!(updated);
    let row = store
        .get_session(&record.session_handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.user_data_in_database, json!({"plan": "pro"}));
    assert_eq!(row.user_data_in_jwt, record.user_data_in_jwt);

    // JWT blob only
    let updated = store
        .update_session_data(&record.session_handle, None, Some(json!({"role": "admin"})))
        .await
        .unwrap();
    assert!(updated);
    let row = store
        .get_session(&record.session_handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.user_data_in_database, json!({"plan": "pro"}));
    assert_eq!(row.user_data_in_jwt, json!({"role": "admin"}));

    // Both at once
    let updated = store
        .update_session_data(
            &record.session_handle,
            Some(json!({"plan": "max"})),
            Some(json!({"role": "owner"})),
        )
        .await
        .unwrap();
    assert!(updated);

    // No fields is an existence check
    assert!(store
        .update_session_data(&record.session_handle, None, None)
        .await
        .unwrap());
    assert!(!store.update_session_data("ghost", None, None).await.unwrap());
}

#[tokio::test]
async fn test_partial_data_update_sqlite() {
    let store = SqliteSessionStore::in_memory().await.unwrap();
    check_partial_data_update(&store).await;
}

#[tokio::test]
async fn test_partial_data_update_memory() {
    check_partial_data_update(&MemorySessionStore::new()).await;
}

async fn check_delete_sessions<S: SessionStore>(store: &S) {
    let now = now_millis();
    let first = session_record("user-1", now);
    let second = session_record("user-1", now);
    store.create_session(first.clone()).await.unwrap();
    store.create_session(second.clone()).await.unwrap();

    let deleted = store
        .delete_sessions(&[first.session_handle.clone(), "ghost".to_string()])
        .await
        .unwrap();
    assert_eq!(deleted, vec![first.session_handle.clone()]);
    assert_eq!(store.get_session_count().await.unwrap(), 1);

    // Deleting again reports nothing
    let deleted = store
        .delete_sessions(&[first.session_handle.clone()])
        .await
        .unwrap();
    assert!(deleted.is_empty());
}

#[tokio::test]
async fn test_delete_sessions_sqlite() {
    let store = SqliteSessionStore::in_memory().await.unwrap();
    check_delete_sessions(&store).await;
}

#[tokio::test]
async fn test_delete_sessions_memory() {
    check_delete_sessions(&MemorySessionStore::new()).await;
}

async fn check_delete_expired_sessions<S: SessionStore>(store: &S) {
    let now = now_millis();
    let mut expired = session_record("user-1", now - Duration::days(101));
    expired.expires_at = now - Duration::days(1);
    let live = session_record("user-1", now);
    store.create_session(expired.clone()).await.unwrap();
    store.create_session(live.clone()).await.unwrap();

    assert_eq!(store.delete_expired_sessions(now).await.unwrap(), 1);
    assert!(store.get_session(&expired.session_handle).await.unwrap().is_none());
    assert!(store.get_session(&live.session_handle).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_expired_sessions_sqlite() {
    let store = SqliteSessionStore::in_memory().await.unwrap();
    check_delete_expired_sessions(&store).await;
}

#[tokio::test]
async fn test_delete_expired_sessions_memory() {
    check_delete_expired_sessions(&MemorySessionStore::new()).await;
}

async fn check_past_token_roundtrip<S: SessionStore>(store: &S) {
    let now = now_millis();
    let record = past_token_record("session-1", "parent-hash", now);
    store.insert_past_token(record.clone()).await.unwrap();

    let fetched = store
        .get_past_token(&record.refresh_token_hash2)
        .await
        .unwrap();
    assert_eq!(fetched, Some(record));
    assert!(store.get_past_token("unknown").await.unwrap().is_none());
    assert_eq!(store.count_past_tokens().await.unwrap(), 1);
}

#[tokio::test]
async fn test_past_token_roundtrip_sqlite() {
    let store = SqliteSessionStore::in_memory().await.unwrap();
    check_past_token_roundtrip(&store).await;
}

#[tokio::test]
async fn test_past_token_roundtrip_memory() {
    check_past_token_roundtrip(&MemorySessionStore::new()).await;
}

async fn check_orphan_sweep_spares_live_sessions<S: SessionStore>(store: &S) {
    let now = now_millis();
    let live = session_record("user-1", now - Duration::days(30));
    store.create_session(live.clone()).await.unwrap();

    // Old row of a live session: kept whatever its age
    let live_history = past_token_record(&live.session_handle, "p", now - Duration::days(30));
    store.insert_past_token(live_history.clone()).await.unwrap();
    // Old row of a gone session: swept
    let orphan_old = past_token_record("gone-session", "p", now - Duration::days(30));
    store.insert_past_token(orphan_old.clone()).await.unwrap();
    // Recent row of a gone session: not old enough yet
    let orphan_recent = past_token_record("gone-session", "p", now - Duration::days(1));
    store.insert_past_token(orphan_recent.clone()).await.unwrap();

    let cutoff = now - Duration::days(7);
    assert_eq!(store.delete_orphaned_past_tokens(cutoff).await.unwrap(), 1);

    assert!(store
        .get_past_token(&live_history.refresh_token_hash2)
        .await
        .unwrap()
        .is_some());
    assert!(store
        .get_past_token(&orphan_old.refresh_token_hash2)
        .await
        .unwrap()
        .is_none());
    assert!(store
        .get_past_token(&orphan_recent.refresh_token_hash2)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_orphan_sweep_spares_live_sessions_sqlite() {
    let store = SqliteSessionStore::in_memory().await.unwrap();
    check_orphan_sweep_spares_live_sessions(&store).await;
}

#[tokio::test]
async fn test_orphan_sweep_spares_live_sessions_memory() {
    check_orphan_sweep_spares_live_sessions(&MemorySessionStore::new()).await;
}

async fn check_signing_key_slot_is_exactly_once<S: SessionStore>(store: &S) {
    let now = now_millis();
    let first = signing_key(KeyKind::Dynamic, 7, now);
    let second = signing_key(KeyKind::Dynamic, 7, now + Duration::seconds(1));

    let winner = store
        .insert_signing_key_if_absent(first.clone())
        .await
        .unwrap();
    assert_eq!(winner.key_id, first.key_id);

    // The slot is taken; the second caller adopts the first key
    let winner = store
        .insert_signing_key_if_absent(second.clone())
        .await
        .unwrap();
    assert_eq!(winner.key_id, first.key_id);

    // A different bucket is a different slot
    let other = signing_key(KeyKind::Dynamic, 8, now + Duration::hours(1));
    let winner = store
        .insert_signing_key_if_absent(other.clone())
        .await
        .unwrap();
    assert_eq!(winner.key_id, other.key_id);

    // Newest first
    let keys = store.get_signing_keys(KeyKind::Dynamic).await.unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].key_id, other.key_id);
    assert_eq!(keys[1].key_id, first.key_id);

    // Kinds are separate slots too
    let fixed = signing_key(KeyKind::Static, 0, now);
    store.insert_signing_key_if_absent(fixed.clone()).await.unwrap();
    let keys = store.get_signing_keys(KeyKind::Static).await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].key_id, fixed.key_id);
}

#[tokio::test]
async fn test_signing_key_slot_is_exactly_once_sqlite() {
    let store = SqliteSessionStore::in_memory().await.unwrap();
    check_signing_key_slot_is_exactly_once(&store).await;
}

#[tokio::test]
async fn test_signing_key_slot_is_exactly_once_memory() {
    check_signing_key_slot_is_exactly_once(&MemorySessionStore::new()).await;
}

async fn check_key_value_first_writer_wins<S: SessionStore>(store: &S) {
    let now = now_millis();
    let first = KeyValueRecord {
        name: "master".to_string(),
        value: "v1".to_string(),
        created_at: now,
    };
    let second = KeyValueRecord {
        name: "master".to_string(),
        value: "v2".to_string(),
        created_at: now + Duration::seconds(1),
    };

    let winner = store.set_key_value_if_absent(first.clone()).await.unwrap();
    assert_eq!(winner.value, "v1");
    let winner = store.set_key_value_if_absent(second).await.unwrap();
    assert_eq!(winner.value, "v1");

    let fetched = store.get_key_value("master").await.unwrap();
    assert_eq!(fetched, Some(first));
    assert!(store.get_key_value("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_key_value_first_writer_wins_sqlite() {
    let store = SqliteSessionStore::in_memory().await.unwrap();
    check_key_value_first_writer_wins(&store).await;
}

#[tokio::test]
async fn test_key_value_first_writer_wins_memory() {
    check_key_value_first_writer_wins(&MemorySessionStore::new()).await;
}
