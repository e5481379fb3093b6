// Integration tests for the full per-user configuration lifecycle:
// store a config, resolve it through the cache, unwrap its credential,
// enforce ownership, and issue/revoke a session token for it.

#[cfg(test)]
mod user_config_workflow_integration_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use catalog_addon_core::user_config::{
        CatalogDefinition, ConfigResolver, ConfigStore, EncryptedBlob, InMemoryConfigStore, Preferences,
        RevocationList, SessionIssuer, UserConfig,
    };
    use catalog_addon_core::user_config::crypto::encrypt_api_key;
    use chrono::Utc;
    use uuid::Uuid;

    fn server_key() -> [u8; 32] {
        [42u8; 32]
    }

    #[tokio::test]
    async fn end_to_end_config_and_session_lifecycle() {
        let store = Arc::new(InMemoryConfigStore::new());
        let raw_api_key = "sk-upstream-live-000111";

        let resolver = ConfigResolver::new(store.clone(), 100, Duration::from_secs(300), server_key());
        let owner_hash = resolver.derive_hash(raw_api_key);

        let encrypted = encrypt_api_key(&server_key(), raw_api_key).unwrap();
        let user_id = Uuid::new_v4();
        let config = UserConfig {
            user_id,
            api_key_id_hash: owner_hash.clone(),
            encrypted_api_key: encrypted,
            catalogs: vec![CatalogDefinition {
                id: "top-rated".to_string(),
                name: "Top Rated".to_string(),
                catalog_type: "movie".to_string(),
                genres: vec!["Drama".to_string()],
                min_rating: Some(7.5),
                min_votes: Some(1_000),
                sort_by: None,
            }],
            preferences: Preferences::default(),
            config_name: "default".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.put(config).await.unwrap();

        // Resolve through the cache and confirm the credential round-trips.
        let resolved = resolver.resolve(user_id).await.unwrap();
        assert_eq!(resolved.catalogs.len(), 1);
        assert_eq!(resolver.unwrap_credential(&resolved).unwrap(), raw_api_key);

        // The true owner's derived hash passes the ownership check;
        // anyone else's derived hash is rejected, distinctly from a
        // not-found error.
        assert!(resolver.assert_owner(&resolved, &owner_hash).is_ok());
        let impostor_hash = resolver.derive_hash("sk-someone-elses-key");
        assert!(resolver.assert_owner(&resolved, &impostor_hash).is_err());

        // Issue a session bound to the owner hash, then revoke it.
        let issuer = SessionIssuer::new("integration-test-secret", Duration::from_secs(3600));
        let (token, _expires_at, jti) = issuer.issue(&owner_hash).unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.api_key_id_hash, owner_hash);

        let revocations = RevocationList::new();
        assert!(!revocations.is_revoked(&jti));
        revocations.revoke(&jti);
        assert!(revocations.is_revoked(&jti));

        // A mutation (delete) invalidates the cached resolution so the
        // next resolve reflects the store's new state rather than a
        // stale cached Arc.
        resolver.invalidate(user_id).await;
        store.delete(user_id).await.unwrap();
        let after_delete = resolver.resolve(user_id).await;
        assert!(after_delete.is_err());
    }

    #[tokio::test]
    async fn list_by_hash_surfaces_only_that_owners_configs() {
        let store = Arc::new(InMemoryConfigStore::new());
        let key_a = [1u8; 32];
        let hash_a = catalog_addon_core::user_config::crypto::derive_api_key_id_hash(&key_a, "key-a");

        for name in ["primary", "backup"] {
            let blob: EncryptedBlob = encrypt_api_key(&key_a, "key-a").unwrap();
            store
                .put(UserConfig {
                    user_id: Uuid::new_v4(),
                    api_key_id_hash: hash_a.clone(),
                    encrypted_api_key: blob,
                    catalogs: vec![],
                    preferences: Preferences::default(),
                    config_name: name.to_string(),
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let others_hash = catalog_addon_core::user_config::crypto::derive_api_key_id_hash(&[9u8; 32], "key-b");
        let mine = store.list_by_hash(&hash_a).await.unwrap();
        let theirs = store.list_by_hash(&others_hash).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(theirs.is_empty());
    }
}
