//! Shared application state threaded through every handler (spec
//! §4 "Composition"), grounded on `api::AppState` — one `Arc`-wrapped
//! bundle cloned cheaply per request via axum's `State` extractor.

use std::sync::Arc;

use crate::dataset::DatasetEngine;
use crate::metrics::Counters;
use crate::settings::Settings;
use crate::shutdown::ShutdownWatch;
use crate::upstream::UpstreamClient;
use crate::user_config::{ConfigResolver, ConfigStore, RevocationList, SessionIssuer};

use super::rate_limit::PerIpLimiter;

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
    /// Cached/single-flight reads go through the resolver; the config
    /// API's write endpoints (create/update/delete/list) talk to the
    /// store directly and then invalidate the resolver's entry.
    pub config_store: Arc<dyn ConfigStore>,
    pub config_resolver: Arc<ConfigResolver>,
    pub dataset: Arc<DatasetEngine>,
    pub sessions: Arc<SessionIssuer>,
    pub revocations: Arc<RevocationList>,
    pub counters: Arc<Counters>,
    pub settings: Arc<Settings>,
    pub shutdown: ShutdownWatch,
    pub rate_limiter: Arc<PerIpLimiter>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}
