//! Per-user configuration data model (spec §3 "Configuration").
//!
//! Shaped like `enterprise::tenant::config::TenantConfig` (ordered
//! sub-lists, a `preferences`-style settings block, plain `chrono`
//! timestamps) but scoped to what a catalog addon's per-user config
//! actually needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Poster artwork source preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PosterSource {
    Upstream,
    Fanart,
    None,
}

impl Default for PosterSource {
    fn default() -> Self {
        PosterSource::Upstream
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub include_adult: bool,
    #[serde(default)]
    pub poster_source: PosterSource,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            language: default_language(),
            include_adult: false,
            poster_source: PosterSource::default(),
        }
    }
}

fn default_language() -> String {
    "en-US".to_string()
}

/// A single catalog entry a user has configured: what upstream query
/// shape populates the addon-protocol `catalog/{type}/{catalogId}`
/// route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDefinition {
    pub id: String,
    pub name: String,
    pub catalog_type: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub min_rating: Option<f32>,
    #[serde(default)]
    pub min_votes: Option<u64>,
    #[serde(default)]
    pub sort_by: Option<String>,
}

/// A user's persisted configuration (spec §3 "Configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub user_id: Uuid,
    /// One-way derivation of the upstream credential (spec §3); never
    /// reversible back to the credential, used only for ownership
    /// assertions.
    pub api_key_id_hash: String,
    /// Authenticated-encryption blob (nonce + ciphertext + tag).
    pub encrypted_api_key: EncryptedBlob,
    pub catalogs: Vec<CatalogDefinition>,
    pub preferences: Preferences,
    pub config_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Nonce + ciphertext pair produced by AES-256-GCM (spec §3
/// "authenticated-encryption blob (random nonce + tag)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}
