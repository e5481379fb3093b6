//! Config resolver (C4): LRU+TTL cache over the config store, with
//! single-flight loading, credential unwrap, and ownership checks
//! (spec §4.4).
//!
//! The cache tier is `moka::future::Cache`, the same crate and builder
//! shape `database::cache::CacheManager` uses for its L1 tier
//! (`max_capacity` + `time_to_live`). The single-flight map reuses
//! the facade's "owner-or-waiter" `OnceCell` pattern (spec §9) rather
//! than introducing a second coordination primitive for the same job.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use moka::future::Cache;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::crypto::{decrypt_api_key, derive_api_key_id_hash};
use super::error::ConfigError;
use super::model::UserConfig;
use super::store::ConfigStore;

type ResolveResult = Result<Arc<UserConfig>, ConfigError>;

pub struct ConfigResolver {
    store: Arc<dyn ConfigStore>,
    cache: Cache<Uuid, Arc<UserConfig>>,
    in_flight: DashMap<Uuid, Arc<OnceCell<ResolveResult>>>,
    credential_key: [u8; 32],
}

impl ConfigResolver {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        capacity: u64,
        ttl: std::time::Duration,
        credential_key: [u8; 32],
    ) -> Self {
        let cache = Cache::builder().max_capacity(capacity).time_to_live(ttl).build();
        Self {
            store,
            cache,
            in_flight: DashMap::new(),
            credential_key,
        }
    }

    /// Resolve a user's configuration, coalescing concurrent misses for
    /// the same `userId` into one store read (spec §4.4 "Single-flight").
    pub async fn resolve(&self, user_id: Uuid) -> Result<Arc<UserConfig>, ConfigError> {
        if let Some(cached) = self.cache.get(&user_id).await {
            return Ok(cached);
        }

        let (cell, is_owner) = match self.in_flight.entry(user_id) {
            Entry::Occupied(e) => (e.get().clone(), false),
            Entry::Vacant(e) => {
                let cell = Arc::new(OnceCell::new());
                e.insert(cell.clone());
                (cell, true)
            }
        };

        let result = cell
            .get_or_init(|| async {
                match self.store.get(user_id).await {
                    Ok(Some(config)) => Ok(Arc::new(config)),
                    Ok(None) => Err(ConfigError::NotFound(user_id.to_string())),
                    Err(e) => Err(e),
                }
            })
            .await
            .clone();

        if is_owner {
            self.in_flight.remove_if(&user_id, |_, v| Arc::ptr_eq(v, &cell));
            if let Ok(config) = &result {
                self.cache.insert(user_id, Arc::clone(config)).await;
            }
        }

        result
    }

    /// Decrypt the stored credential for `config` (spec §4.4 "Credential
    /// unwrap"). A decryption failure is always a permanent error, never
    /// cached or retried.
    pub fn unwrap_credential(&self, config: &UserConfig) -> Result<String, ConfigError> {
        decrypt_api_key(&self.credential_key, &config.encrypted_api_key)
    }

    /// Derive the ownership hash for a raw upstream credential, using
    /// this resolver's server-held key as the KDF salt.
    pub fn derive_hash(&self, raw_api_key: &str) -> String {
        derive_api_key_id_hash(&self.credential_key, raw_api_key)
    }

    /// Verify that `caller_hash` owns `config` (spec §4.4 "Ownership").
    /// Mismatch yields a distinguishable forbidden error, never
    /// not-found, so callers can't probe for valid `userId`s.
    pub fn assert_owner(&self, config: &UserConfig, caller_hash: &str) -> Result<(), ConfigError> {
        if config.api_key_id_hash == caller_hash {
            Ok(())
        } else {
            Err(ConfigError::OwnershipMismatch)
        }
    }

    /// Invalidate a cached entry after a mutation (create/update/delete).
    pub async fn invalidate(&self, user_id: Uuid) {
        self.cache.invalidate(&user_id).await;
    }
}
