//! Lazy, exactly-once signing key provisioning on top of the session store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use portcullis_shared::clock::Clock;
use portcullis_shared::config::KeySettings;

use crate::domain::entities::{KeyKind, PublicSigningKey, SigningKeyRecord};
use crate::errors::StoreResult;
use crate::repositories::SessionStore;

use super::material;

/// Provides signing keys for access tokens, creating them lazily.
///
/// Time is divided into rotation buckets of the configured interval; each
/// `(kind, bucket)` pair has exactly one key, enforced by the store's
/// insert-if-absent primitive rather than any process-local lock, so the
/// guarantee holds across replicas. Static keys live in bucket 0 forever.
pub struct SigningKeyStore<S: SessionStore> {
    store: Arc<S>,
    settings: KeySettings,
    clock: Arc<dyn Clock>,
    /// Process-local cache by key id; the store stays authoritative
    cache: RwLock<HashMap<String, SigningKeyRecord>>,
}

impl<S: SessionStore> SigningKeyStore<S> {
    pub fn new(store: Arc<S>, settings: KeySettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            settings,
            clock,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Rotation bucket a key of `kind` belongs to at `now`
    fn bucket_at(&self, kind: KeyKind, now: DateTime<Utc>) -> i64 {
        match kind {
            KeyKind::Static => 0,
            KeyKind::Dynamic => {
                let interval = self.settings.rotation_interval().num_milliseconds().max(1);
                now.timestamp_millis() / interval
            }
        }
    }

    /// The key to sign with right now, creating one if this rotation bucket
    /// has none yet.
    ///
    /// Concurrent callers (including other replicas) racing on a fresh
    /// bucket all end up holding the same winning record.
    pub async fn key_for_signing(&self, kind: KeyKind) -> StoreResult<SigningKeyRecord> {
        let now = self.clock.now();
        let bucket = self.bucket_at(kind, now);

        {
            let cache = self.cache.read().await;
            if let Some(key) = cache
                .values()
                .find(|k| k.kind == kind && k.bucket == bucket)
            {
                return Ok(key.clone());
            }
        }

        // Cache miss: another process may already have minted this bucket
        let known = self.store.get_signing_keys(kind).await?;
        self.merge_cache(&known).await;
        if let Some(key) = known.iter().find(|k| k.bucket == bucket) {
            return Ok(key.clone());
        }

        let fresh = material::generate_key_record(kind, bucket, now);
        let fresh_id = fresh.key_id.clone();
        let winner = self.store.insert_signing_key_if_absent(fresh).await?;
        if winner.key_id == fresh_id {
            info!(key_id = %winner.key_id, kind = kind.as_str(), bucket, "signing key created");
        } else {
            debug!(key_id = %winner.key_id, "adopted signing key created by a concurrent writer");
        }
        self.merge_cache(std::slice::from_ref(&winner)).await;
        Ok(winner)
    }

    /// Look up a key for verification.
    ///
    /// Returns `None` when the id is unknown or the key has aged out of its
    /// verification retention window.
    pub async fn key_for_verifying(&self, key_id: &str) -> StoreResult<Option<SigningKeyRecord>> {
        let now = self.clock.now();
        let retention = self.settings.verification_retention();

        {
            let cache = self.cache.read().await;
            if let Some(key) = cache.get(key_id) {
                return Ok(Some(key.clone()).filter(|k| k.verifies_at(now, retention)));
            }
        }

        // Unknown locally: the key may have been minted by another replica
        let found = self.refresh_all_kinds().await?.remove(key_id);
        Ok(found.filter(|k| k.verifies_at(now, retention)))
    }

    /// Whether a newer key of the same kind has taken over signing.
    ///
    /// Static keys are never superseded.
    pub fn is_superseded(&self, key: &SigningKeyRecord) -> bool {
        match key.kind {
            KeyKind::Static => false,
            KeyKind::Dynamic => self.bucket_at(KeyKind::Dynamic, self.clock.now()) > key.bucket,
        }
    }

    /// Publishable halves of every key still inside its verification window,
    /// dynamic keys newest first followed by static keys.
    pub async fn public_verification_keys(&self) -> StoreResult<Vec<PublicSigningKey>> {
        let now = self.clock.now();
        let retention = self.settings.verification_retention();

        let dynamic = self.store.get_signing_keys(KeyKind::Dynamic).await?;
        let statics = self.store.get_signing_keys(KeyKind::Static).await?;
        self.merge_cache(&dynamic).await;
        self.merge_cache(&statics).await;

        Ok(dynamic
            .iter()
            .chain(statics.iter())
            .filter(|k| k.verifies_at(now, retention))
            .map(PublicSigningKey::from)
            .collect())
    }

    async fn refresh_all_kinds(&self) -> StoreResult<HashMap<String, SigningKeyRecord>> {
        let dynamic = self.store.get_signing_keys(KeyKind::Dynamic).await?;
        let statics = self.store.get_signing_keys(KeyKind::Static).await?;
        self.merge_cache(&dynamic).await;
        self.merge_cache(&statics).await;

        let mut merged = HashMap::new();
        for key in dynamic.into_iter().chain(statics) {
            merged.insert(key.key_id.clone(), key);
        }
        Ok(merged)
    }

    async fn merge_cache(&self, keys: &[SigningKeyRecord]) {
        if keys.is_empty() {
            return;
        }
        let mut cache = self.cache.write().await;
        for key in keys {
            cache.insert(key.key_id.clone(), key.clone());
        }
    }
}
