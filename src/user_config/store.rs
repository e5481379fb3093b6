//! `ConfigStore`: the persistence interface the resolver consumes.
//!
//! Spec §1 scopes concrete persistence adapters (PostgreSQL/document
//! store/in-memory) out of the core, "described only by the interfaces
//! the core consumes." This module defines that interface plus an
//! in-memory implementation for tests — grounded on the trait-fronted
//! repository shape of `enterprise::database::repository`.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::error::ConfigError;
use super::model::UserConfig;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserConfig>, ConfigError>;
    async fn put(&self, config: UserConfig) -> Result<(), ConfigError>;
    async fn delete(&self, user_id: Uuid) -> Result<(), ConfigError>;
    /// All configurations whose `apiKeyIdHash` matches the caller's
    /// derived hash (spec §6 `GET /api/configs`).
    async fn list_by_hash(&self, api_key_id_hash: &str) -> Result<Vec<UserConfig>, ConfigError>;
}

/// In-memory test double. Not a deployment target — concrete adapters
/// live outside this core (spec §1 Non-goals).
#[derive(Default)]
pub struct InMemoryConfigStore {
    entries: DashMap<Uuid, UserConfig>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserConfig>, ConfigError> {
        Ok(self.entries.get(&user_id).map(|e| e.clone()))
    }

    async fn put(&self, config: UserConfig) -> Result<(), ConfigError> {
        self.entries.insert(config.user_id, config);
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<(), ConfigError> {
        self.entries.remove(&user_id);
        Ok(())
    }

    async fn list_by_hash(&self, api_key_id_hash: &str) -> Result<Vec<UserConfig>, ConfigError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.api_key_id_hash == api_key_id_hash)
            .map(|e| e.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_config::model::{EncryptedBlob, Preferences};
    use chrono::Utc;

    fn sample(hash: &str) -> UserConfig {
        UserConfig {
            user_id: Uuid::new_v4(),
            api_key_id_hash: hash.to_string(),
            encrypted_api_key: EncryptedBlob { nonce: vec![0; 12], ciphertext: vec![1, 2, 3] },
            catalogs: vec![],
            preferences: Preferences::default(),
            config_name: "default".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let store = InMemoryConfigStore::new();
        let cfg = sample("hash-a");
        let id = cfg.user_id;
        store.put(cfg).await.unwrap();
        assert!(store.get(id).await.unwrap().is_some());
        store.delete(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_by_hash_filters() {
        let store = InMemoryConfigStore::new();
        store.put(sample("hash-a")).await.unwrap();
        store.put(sample("hash-a")).await.unwrap();
        store.put(sample("hash-b")).await.unwrap();
        assert_eq!(store.list_by_hash("hash-a").await.unwrap().len(), 2);
        assert_eq!(store.list_by_hash("hash-b").await.unwrap().len(), 1);
    }
}
