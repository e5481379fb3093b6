//! Addon-protocol and config-API route scaffolding (spec §6).
//!
//! Per SPEC_FULL.md §A.4, this module owns no resilience or caching
//! logic of its own — every handler extracts request parameters, calls
//! into `cache`/`upstream`/`user_config`/`dataset`, and maps the result
//! through [`responses::ApiError`].

pub mod addon;
pub mod api;
pub mod rate_limit;
pub mod responses;
pub mod state;

pub use rate_limit::PerIpLimiter;
pub use state::AppState;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::CoreError;
use responses::ApiError;

/// Build the full router: addon protocol (read-only, no auth) plus
/// the bearer-authenticated configuration API (spec §6).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/:user_id/manifest.json", get(addon::manifest))
        .route("/:user_id/catalog/:type/:catalog_id.json", get(addon::catalog))
        .route(
            "/:user_id/catalog/:type/:catalog_id/:extra.json",
            get(addon::catalog_with_extra),
        )
        .route("/:user_id/meta/:type/:id.json", get(addon::meta))
        .route("/:user_id/meta/:type/:id/:extra.json", get(addon::meta_with_extra))
        .route("/api/auth/login", post(api::login))
        .route("/api/auth/logout", post(api::logout))
        .route("/api/auth/verify", get(api::verify))
        .route("/api/configs", get(api::list_configs))
        .route("/api/config", post(api::create_config))
        .route(
            "/api/config/:user_id",
            get(api::get_config).put(api::put_config).delete(api::delete_config),
        )
        .route("/api/preview", post(api::preview))
        .route("/api/reference-data", get(api::reference_data))
        .route("/api/reference-data/:kind", get(api::reference_data_kind))
        .route("/api/search/:kind", get(api::search))
        .route("/api/:kind/:id", get(api::lookup))
        .route("/health", get(api::health))
        .route("/ready", get(api::ready))
        .route("/metrics", get(api::metrics))
        .route("/api/status", get(api::status))
        .route("/api/stats", get(api::stats))
        .route("/api/validate-key", post(api::validate_key))
        .layer(middleware::from_fn_with_state(state.clone(), reject_while_draining))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Operational endpoints an orchestrator still needs to reach while
/// the server is draining (spec §5 "Shutdown" — the new-request
/// rejection is for traffic, not liveness/readiness probes).
fn is_ops_endpoint(path: &str) -> bool {
    matches!(path, "/health" | "/ready" | "/metrics")
}

/// Reject new requests with 503 while the server is draining (spec §5
/// "new requests return service-unavailable"), grounded on the same
/// `ShutdownWatch` every other suspension point in this crate already
/// observes (token-bucket waiters, the dataset refresh ticker, the
/// revocation sweeper).
async fn reject_while_draining(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.shutdown.is_draining() && !is_ops_endpoint(request.uri().path()) {
        return Err(ApiError::from(CoreError::Draining));
    }
    Ok(next.run(request).await)
}
