//! Configuration API handlers (spec §6 "Configuration API").
//!
//! Session verification, credential hashing/encryption, ownership
//! checks, and cache/dataset queries all live in C2–C5; these handlers
//! only extract parameters, sequence those calls, and shape the JSON
//! response — the same "router is scaffolding" boundary SPEC_FULL.md
//! §A.4 draws for the addon handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::dataset::{DatasetQuery, TitleType};
use crate::error::CoreError;
use crate::user_config::{CatalogDefinition, Preferences, UserConfig};

use super::responses::ApiError;
use super::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Result<&str, CoreError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(CoreError::Unauthorized)
}

/// Verify the bearer token and return the caller's `apiKeyIdHash`.
/// Spec §4.4 "Sessions": a token must both verify and not be revoked.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<(String, String), CoreError> {
    let token = bearer_token(headers)?;
    let claims = state
        .sessions
        .verify(token)
        .map_err(|_| CoreError::Unauthorized)?;
    if state.revocations.is_revoked(&claims.jti) {
        return Err(CoreError::Unauthorized);
    }
    Ok((claims.api_key_id_hash, claims.jti))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub api_key: String,
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub user_id: Uuid,
    pub config_name: String,
    pub catalogs: Vec<CatalogDefinition>,
    pub preferences: Preferences,
}

impl From<&UserConfig> for ConfigSummary {
    fn from(c: &UserConfig) -> Self {
        Self {
            user_id: c.user_id,
            config_name: c.config_name.clone(),
            catalogs: c.catalogs.clone(),
            preferences: c.preferences.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub config_name: String,
    pub is_new_user: bool,
    pub configs: Vec<ConfigSummary>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let hash = state.config_resolver.derive_hash(&req.api_key);

    let (user_id, is_new_user) = match req.user_id {
        Some(uid) => {
            let config = state.config_resolver.resolve(uid).await.map_err(CoreError::from)?;
            state.config_resolver.assert_owner(&config, &hash).map_err(CoreError::from)?;
            (uid, false)
        }
        None => {
            let existing = state.config_store.list_by_hash(&hash).await.map_err(CoreError::from)?;
            if let Some(config) = existing.first() {
                (config.user_id, false)
            } else {
                let user_id = Uuid::new_v4();
                let encrypted_api_key = crate::user_config::crypto::encrypt_api_key(
                    &state.settings.session.credential_encryption_key,
                    &req.api_key,
                )
                .map_err(CoreError::from)?;
                let now = Utc::now();
                let config = UserConfig {
                    user_id,
                    api_key_id_hash: hash.clone(),
                    encrypted_api_key,
                    catalogs: Vec::new(),
                    preferences: Preferences::default(),
                    config_name: "default".to_string(),
                    created_at: now,
                    updated_at: now,
                };
                state.config_store.put(config).await.map_err(CoreError::from)?;
                (user_id, true)
            }
        }
    };

    let ttl = if req.remember_me {
        state.settings.session.session_ttl * 4
    } else {
        state.settings.session.session_ttl
    };
    let issuer = crate::user_config::SessionIssuer::new(&state.settings.session.jwt_secret, ttl);
    let (token, expires_at, _jti) = issuer.issue(&hash).map_err(CoreError::from)?;

    let configs = state.config_store.list_by_hash(&hash).await.map_err(CoreError::from)?;
    let config_name = configs
        .iter()
        .find(|c| c.user_id == user_id)
        .map(|c| c.config_name.clone())
        .unwrap_or_default();

    Ok(Json(LoginResponse {
        token,
        expires_at,
        user_id,
        config_name,
        is_new_user,
        configs: configs.iter().map(ConfigSummary::from).collect(),
    }))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    let (_, jti) = authenticate(&state, &headers).await?;
    state.revocations.revoke(&jti);
    Ok(Json(json!({"ok": true})))
}

pub async fn verify(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    let (hash, _) = authenticate(&state, &headers).await?;
    Ok(Json(json!({"valid": true, "apiKeyIdHash": hash})))
}

pub async fn list_configs(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<ConfigSummary>>, ApiError> {
    let (hash, _) = authenticate(&state, &headers).await?;
    let configs = state.config_store.list_by_hash(&hash).await.map_err(CoreError::from)?;
    Ok(Json(configs.iter().map(ConfigSummary::from).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertConfigRequest {
    pub config_name: String,
    #[serde(default)]
    pub catalogs: Vec<CatalogDefinition>,
    #[serde(default)]
    pub preferences: Preferences,
}

pub async fn create_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpsertConfigRequest>,
) -> Result<Json<ConfigSummary>, ApiError> {
    let (hash, _) = authenticate(&state, &headers).await?;
    let existing = state.config_store.list_by_hash(&hash).await.map_err(CoreError::from)?;
    let source = existing
        .first()
        .ok_or(CoreError::Validation("no existing configuration to clone credentials from".into()))?;

    let now = Utc::now();
    let config = UserConfig {
        user_id: Uuid::new_v4(),
        api_key_id_hash: hash,
        encrypted_api_key: source.encrypted_api_key.clone(),
        catalogs: req.catalogs,
        preferences: req.preferences,
        config_name: req.config_name,
        created_at: now,
        updated_at: now,
    };
    state.config_store.put(config.clone()).await.map_err(CoreError::from)?;
    Ok(Json(ConfigSummary::from(&config)))
}

async fn owned_config(state: &AppState, headers: &HeaderMap, user_id: Uuid) -> Result<Arc<UserConfig>, CoreError> {
    let (hash, _) = authenticate(state, headers).await?;
    let config = state.config_resolver.resolve(user_id).await?;
    state.config_resolver.assert_owner(&config, &hash)?;
    Ok(config)
}

pub async fn get_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ConfigSummary>, ApiError> {
    let config = owned_config(&state, &headers, user_id).await?;
    Ok(Json(ConfigSummary::from(config.as_ref())))
}

pub async fn put_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpsertConfigRequest>,
) -> Result<Json<ConfigSummary>, ApiError> {
    let existing = owned_config(&state, &headers, user_id).await?;

    let updated = UserConfig {
        user_id,
        api_key_id_hash: existing.api_key_id_hash.clone(),
        encrypted_api_key: existing.encrypted_api_key.clone(),
        catalogs: req.catalogs,
        preferences: req.preferences,
        config_name: req.config_name,
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    state.config_store.put(updated.clone()).await.map_err(CoreError::from)?;
    state.config_resolver.invalidate(user_id).await;
    Ok(Json(ConfigSummary::from(&updated)))
}

pub async fn delete_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    owned_config(&state, &headers, user_id).await?;
    state.config_store.delete(user_id).await.map_err(CoreError::from)?;
    state.config_resolver.invalidate(user_id).await;
    Ok(Json(json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(rename = "type")]
    pub title_type: String,
    pub filters: CatalogDefinition,
    #[serde(default)]
    pub page: usize,
}

/// Preview a catalog definition against the dataset without saving it
/// (spec §6 "preview a catalog definition without saving").
pub async fn preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers).await?;

    let title_type = match req.title_type.as_str() {
        "series" => TitleType::Series,
        _ => TitleType::Movie,
    };
    let query = DatasetQuery {
        genre: req.filters.genres.first().cloned(),
        min_rating: req.filters.min_rating,
        min_votes: req.filters.min_votes,
        skip: req.page * 100,
        limit: 100,
        ..Default::default()
    };
    let snapshot = state.dataset.snapshot();
    let page = crate::dataset::run_query(&snapshot, title_type, &query);
    let metas: Vec<Value> = page
        .items
        .iter()
        .map(|t| json!({"id": t.id, "type": t.title_type.as_str(), "name": t.title, "rating": t.rating}))
        .collect();
    Ok(Json(json!({"metas": metas, "total": page.total})))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
}

pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(kind): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    let (hash, _) = authenticate(&state, &headers).await?;
    let _ = hash;
    let endpoint = format!("search/{kind}");
    let value = state
        .upstream
        .fetch(&endpoint, &[("query".to_string(), params.query)], Duration::from_secs(86_400))
        .await
        .map_err(CoreError::from)?;
    Ok(Json(value))
}

pub async fn lookup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers).await?;
    let endpoint = format!("{kind}/{id}");
    let value = state
        .upstream
        .fetch(&endpoint, &[], Duration::from_secs(604_800))
        .await
        .map_err(CoreError::from)?;
    Ok(Json(value))
}

/// Batch reference-data fetch (spec §6 "`GET /api/reference-data`
/// (batch)").
pub async fn reference_data(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers).await?;
    let kinds = ["genres", "languages", "countries", "certifications", "watch-providers", "watch-regions"];
    let mut out = serde_json::Map::new();
    for kind in kinds {
        let endpoint = format!("reference/{kind}");
        match state.upstream.fetch(&endpoint, &[], Duration::from_secs(604_800)).await {
            Ok(v) => {
                out.insert(kind.to_string(), v);
            }
            Err(e) => {
                tracing::warn!(kind, error = %e, "reference-data batch fetch failed for one kind");
            }
        }
    }
    Ok(Json(Value::Object(out)))
}

pub async fn reference_data_kind(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(kind): Path<String>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers).await?;
    let endpoint = format!("reference/{kind}");
    let value = state
        .upstream
        .fetch(&endpoint, &[], Duration::from_secs(604_800))
        .await
        .map_err(CoreError::from)?;
    Ok(Json(value))
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn ready(State(state): State<AppState>) -> Json<Value> {
    let breaker_state = state.upstream.breaker_state();
    let dataset_age_secs = state
        .dataset
        .last_successful_refresh()
        .map(|t| (Utc::now() - t).num_seconds());
    Json(json!({
        "draining": state.shutdown.is_draining(),
        "breakerState": format!("{:?}", breaker_state),
        "datasetAgeSeconds": dataset_age_secs,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> String {
    state.counters.render_prometheus()
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "version": crate::VERSION,
        "uptimeSeconds": (Utc::now() - state.started_at).num_seconds(),
        "datasetTitles": state.dataset.snapshot().total_titles(),
    }))
}

pub async fn stats(State(state): State<AppState>) -> Json<Value> {
    let c = &state.counters;
    use std::sync::atomic::Ordering;
    Json(json!({
        "cacheHits": c.hits.load(Ordering::Relaxed),
        "cacheMisses": c.misses.load(Ordering::Relaxed),
        "cacheErrors": c.errors.load(Ordering::Relaxed),
        "staleServed": c.stale_served.load(Ordering::Relaxed),
        "breakerRejections": c.breaker_rejections.load(Ordering::Relaxed),
        "bucketTimeouts": c.bucket_timeouts.load(Ordering::Relaxed),
        "datasetRefreshSuccesses": c.dataset_refresh_successes.load(Ordering::Relaxed),
        "datasetRefreshFailures": c.dataset_refresh_failures.load(Ordering::Relaxed),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ValidateKeyRequest {
    pub api_key: String,
}

pub async fn validate_key(
    State(state): State<AppState>,
    Json(req): Json<ValidateKeyRequest>,
) -> Result<Json<Value>, ApiError> {
    let value = state
        .upstream
        .fetch(
            "validate",
            &[("api_key".to_string(), req.api_key)],
            Duration::from_secs(60),
        )
        .await
        .map_err(CoreError::from)?;
    Ok(Json(json!({"valid": true, "detail": value})))
}
