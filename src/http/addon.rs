//! Addon protocol handlers (spec §6 "Addon protocol").
//!
//! Per SPEC_FULL.md §A.4, these extract path/query parameters, resolve
//! the caller's configuration through C4, then delegate to C3 (for
//! on-demand upstream catalogs/metadata) or C5 (for dataset-derived
//! catalogs) — no resilience or caching decisions are made here, they
//! all live in the components these handlers call into.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::dataset::{DatasetQuery, TitleType};
use crate::error::CoreError;
use crate::user_config::UserConfig;

use super::responses::ApiError;
use super::state::AppState;

/// Parse a slash-separated `key=value` extra segment (spec §6
/// "`extra` is a `key=value` pair list ... URL-encoded,
/// slash-separated").
fn parse_extra(extra: &str) -> HashMap<String, String> {
    extra
        .split('/')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((
                urlencoding::decode(k).ok()?.into_owned(),
                urlencoding::decode(v).ok()?.into_owned(),
            ))
        })
        .collect()
}

/// A weak, content-derived validator for conditional GET (spec §6
/// "a weak, content-derived cache validator").
fn weak_etag(body: &Value) -> String {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    format!("W/\"{}\"", blake3::hash(&bytes).to_hex())
}

/// Short-circuit with 304 if the request's `If-None-Match` matches the
/// computed validator; otherwise attach it and return 200.
fn conditional_json(headers: &HeaderMap, body: Value) -> Response {
    let etag = weak_etag(&body);
    if headers
        .get(axum::http::header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        == Some(etag.as_str())
    {
        return StatusCode::NOT_MODIFIED.into_response();
    }
    let mut resp = Json(body).into_response();
    resp.headers_mut()
        .insert(axum::http::header::ETAG, HeaderValue::from_str(&etag).unwrap());
    resp
}

async fn resolve_user(state: &AppState, user_id: Uuid) -> Result<Arc<UserConfig>, CoreError> {
    state.config_resolver.resolve(user_id).await.map_err(CoreError::from)
}

pub async fn manifest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let config = resolve_user(&state, user_id).await?;

    let catalogs: Vec<Value> = config
        .catalogs
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.name,
                "type": c.catalog_type,
                "genres": c.genres,
            })
        })
        .collect();

    let body = json!({
        "id": format!("catalog-addon.{}", user_id),
        "name": config.config_name,
        "version": crate::VERSION,
        "catalogs": catalogs,
        "types": ["movie", "series"],
        "idPrefixes": ["tt"],
    });

    Ok(conditional_json(&headers, body))
}

fn find_catalog<'a>(config: &'a UserConfig, catalog_id: &str) -> Option<&'a crate::user_config::CatalogDefinition> {
    config.catalogs.iter().find(|c| c.id == catalog_id)
}

async fn catalog_payload(
    state: &AppState,
    user_id: Uuid,
    type_: &str,
    catalog_id: &str,
    extra: HashMap<String, String>,
) -> Result<Value, CoreError> {
    let config = resolve_user(state, user_id).await?;
    let catalog = find_catalog(&config, catalog_id)
        .ok_or_else(|| CoreError::Validation(format!("unknown catalog {catalog_id}")))?;

    if catalog.catalog_type == "dataset" {
        let title_type = match type_ {
            "series" => TitleType::Series,
            _ => TitleType::Movie,
        };
        let skip = extra.get("skip").and_then(|s| s.parse().ok()).unwrap_or(0);
        let genre = extra.get("genre").cloned().or_else(|| catalog.genres.first().cloned());
        let query = DatasetQuery {
            genre,
            min_rating: catalog.min_rating,
            min_votes: catalog.min_votes,
            skip,
            limit: 100,
            ..Default::default()
        };
        let snapshot = state.dataset.snapshot();
        let page = crate::dataset::run_query(&snapshot, title_type, &query);
        let metas: Vec<Value> = page
            .items
            .iter()
            .map(|t| json!({"id": t.id, "type": t.title_type.as_str(), "name": t.title}))
            .collect();
        Ok(json!({"metas": metas}))
    } else {
        let credential = state.config_resolver.unwrap_credential(&config)?;
        let mut params: Vec<(String, String)> = extra.into_iter().collect();
        params.push(("api_key".to_string(), credential));
        params.push(("type".to_string(), type_.to_string()));
        let endpoint = format!("catalog/{catalog_id}");
        let value = state
            .upstream
            .fetch(&endpoint, &params, std::time::Duration::from_secs(21_600))
            .await?;
        Ok(value)
    }
}

/// The addon protocol's trailing path segment always carries a
/// literal `.json` suffix (spec §6); routes capture it as part of the
/// segment (axum can't split a literal suffix from a dynamic segment),
/// so handlers strip it before using the value as an id/extra string.
fn strip_json_suffix(segment: &str) -> &str {
    segment.strip_suffix(".json").unwrap_or(segment)
}

pub async fn catalog(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user_id, type_, catalog_id)): Path<(Uuid, String, String)>,
) -> Result<Response, ApiError> {
    let catalog_id = strip_json_suffix(&catalog_id);
    let body = catalog_payload(&state, user_id, &type_, catalog_id, HashMap::new()).await?;
    Ok(conditional_json(&headers, body))
}

pub async fn catalog_with_extra(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user_id, type_, catalog_id, extra)): Path<(Uuid, String, String, String)>,
) -> Result<Response, ApiError> {
    let extra = strip_json_suffix(&extra);
    let body = catalog_payload(&state, user_id, &type_, &catalog_id, parse_extra(extra)).await?;
    Ok(conditional_json(&headers, body))
}

/// Unknown external ids yield an empty meta response rather than 404
/// (spec §6 "Unknown IDs yield an empty-meta response, not a 404").
async fn meta_payload(
    state: &AppState,
    user_id: Uuid,
    type_: &str,
    id: &str,
    language: Option<&str>,
) -> Result<Value, CoreError> {
    let config = resolve_user(state, user_id).await?;
    let credential = state.config_resolver.unwrap_credential(&config)?;

    let mut params = vec![("api_key".to_string(), credential), ("type".to_string(), type_.to_string())];
    if let Some(lang) = language {
        params.push(("language".to_string(), lang.to_string()));
    }

    let endpoint = format!("meta/{id}");
    match state
        .upstream
        .fetch(&endpoint, &params, std::time::Duration::from_secs(86_400))
        .await
    {
        Ok(value) => Ok(value),
        Err(e) if e.status_code() == 404 => Ok(json!({"meta": null})),
        Err(e) => Err(CoreError::from(e)),
    }
}

pub async fn meta(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user_id, type_, id)): Path<(Uuid, String, String)>,
) -> Result<Response, ApiError> {
    let id = strip_json_suffix(&id);
    let body = meta_payload(&state, user_id, &type_, id, None).await?;
    Ok(conditional_json(&headers, body))
}

pub async fn meta_with_extra(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user_id, type_, id, extra)): Path<(Uuid, String, String, String)>,
) -> Result<Response, ApiError> {
    let extra = strip_json_suffix(&extra);
    let parsed = parse_extra(extra);
    let body = meta_payload(&state, user_id, &type_, &id, parsed.get("language").map(String::as_str)).await?;
    Ok(conditional_json(&headers, body))
}
