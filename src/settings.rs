//! Process configuration, loaded from environment variables.
//!
//! Plain `serde::Deserialize` + `#[serde(default)]` config structs,
//! nested per subsystem, with no external config-loading crate and no
//! TOML file: `main.rs` reads configuration straight from `std::env`,
//! the right fit for a service meant to run from a single container
//! image.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Top-level process settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache: CacheSettings,
    pub upstream: UpstreamSettings,
    pub session: SessionSettings,
    pub dataset: DatasetSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// `memory` or `redis`. The factory falls back to `memory` if the
    /// networked backend fails to initialize (see `cache::kv::build_backend`).
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_key_limit")]
    pub in_process_key_limit: usize,
    /// Process-wide version prefix; bumping it invalidates the cache
    /// without deleting anything (spec §4.2 "Versioning").
    #[serde(default = "default_cache_version")]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSettings {
    pub base_url: String,
    /// Allowlisted hosts the URL validator accepts (spec §4.3).
    #[serde(default = "default_allowlist")]
    pub allowed_hosts: Vec<String>,
    /// Upstream API credential, appended as a query parameter.
    pub api_key: String,
    #[serde(default = "default_rate")]
    pub requests_per_second: f64,
    #[serde(default = "default_bucket_capacity")]
    pub bucket_capacity: f64,
    #[serde(default = "default_waiter_bound")]
    pub waiter_queue_bound: usize,
    #[serde(default = "default_breaker_threshold")]
    pub breaker_failure_threshold: u32,
    #[serde(default = "default_breaker_window")]
    pub breaker_window: Duration,
    #[serde(default = "default_breaker_open_duration")]
    pub breaker_open_duration: Duration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub jwt_secret: String,
    pub credential_encryption_key: [u8; 32],
    pub session_ttl: Duration,
    pub config_cache_ttl: Duration,
    pub config_cache_capacity: u64,
    pub revocation_sweep_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSettings {
    pub basics_url: String,
    pub ratings_url: String,
    #[serde(default = "default_refresh_hours")]
    pub refresh_interval_hours: u64,
    #[serde(default = "default_min_votes")]
    pub min_votes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: Duration,
    #[serde(default = "default_global_rate_limit")]
    pub per_ip_global_per_minute: u32,
    #[serde(default = "default_addon_rate_limit")]
    pub per_ip_addon_per_minute: u32,
    #[serde(default = "default_write_rate_limit")]
    pub per_ip_write_per_minute: u32,
}

fn default_backend() -> String {
    "memory".to_string()
}
fn default_key_limit() -> usize {
    50_000
}
fn default_cache_version() -> String {
    "v1".to_string()
}
fn default_allowlist() -> Vec<String> {
    vec!["api.themoviedb.org".to_string()]
}
fn default_rate() -> f64 {
    35.0
}
fn default_bucket_capacity() -> f64 {
    35.0
}
fn default_waiter_bound() -> usize {
    500
}
fn default_breaker_threshold() -> u32 {
    10
}
fn default_breaker_window() -> Duration {
    Duration::from_secs(60)
}
fn default_breaker_open_duration() -> Duration {
    Duration::from_secs(30)
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_max_retries() -> u32 {
    3
}
fn default_refresh_hours() -> u64 {
    24
}
fn default_min_votes() -> u64 {
    10
}
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_shutdown_grace() -> Duration {
    Duration::from_secs(20)
}
fn default_global_rate_limit() -> u32 {
    300
}
fn default_addon_rate_limit() -> u32 {
    1000
}
fn default_write_rate_limit() -> u32 {
    60
}

impl Settings {
    /// Load settings from the process environment. Never panics;
    /// missing optional variables fall back to documented defaults,
    /// missing required secrets surface a `SettingsError`.
    pub fn from_env() -> Result<Self, SettingsError> {
        let base_url = require_env("UPSTREAM_BASE_URL")?;
        let api_key = require_env("UPSTREAM_API_KEY")?;
        let jwt_secret = require_env("SESSION_JWT_SECRET")?;
        let key_b64 = require_env("SESSION_CREDENTIAL_KEY_B64")?;
        let basics_url = require_env("DATASET_BASICS_URL")?;
        let ratings_url = require_env("DATASET_RATINGS_URL")?;

        let credential_encryption_key = decode_key(&key_b64)?;

        let cache = CacheSettings {
            backend: env_or("CACHE_BACKEND", default_backend()),
            redis_url: std::env::var("CACHE_REDIS_URL").ok(),
            in_process_key_limit: env_parsed("CACHE_KEY_LIMIT", default_key_limit())?,
            version: env_or("CACHE_VERSION", default_cache_version()),
        };

        let upstream = UpstreamSettings {
            base_url,
            allowed_hosts: std::env::var("UPSTREAM_ALLOWED_HOSTS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(default_allowlist),
            api_key,
            requests_per_second: env_parsed("UPSTREAM_RPS", default_rate())?,
            bucket_capacity: env_parsed("UPSTREAM_BUCKET_CAPACITY", default_bucket_capacity())?,
            waiter_queue_bound: env_parsed("UPSTREAM_WAITER_BOUND", default_waiter_bound())?,
            breaker_failure_threshold: env_parsed(
                "UPSTREAM_BREAKER_THRESHOLD",
                default_breaker_threshold(),
            )?,
            breaker_window: default_breaker_window(),
            breaker_open_duration: default_breaker_open_duration(),
            request_timeout: default_request_timeout(),
            max_retries: env_parsed("UPSTREAM_MAX_RETRIES", default_max_retries())?,
        };

        let session = SessionSettings {
            jwt_secret,
            credential_encryption_key,
            session_ttl: Duration::from_secs(env_parsed("SESSION_TTL_SECS", 86_400u64)?),
            config_cache_ttl: Duration::from_secs(300),
            config_cache_capacity: env_parsed("CONFIG_CACHE_CAPACITY", 1000u64)?,
            revocation_sweep_interval: Duration::from_secs(600),
        };

        let dataset = DatasetSettings {
            basics_url,
            ratings_url,
            refresh_interval_hours: env_parsed("DATASET_REFRESH_HOURS", default_refresh_hours())?,
            min_votes: env_parsed("DATASET_MIN_VOTES", default_min_votes())?,
        };

        let server = ServerSettings {
            bind_addr: env_or("SERVER_BIND_ADDR", default_bind_addr()),
            shutdown_grace: default_shutdown_grace(),
            per_ip_global_per_minute: env_parsed("RATE_LIMIT_GLOBAL", default_global_rate_limit())?,
            per_ip_addon_per_minute: env_parsed("RATE_LIMIT_ADDON", default_addon_rate_limit())?,
            per_ip_write_per_minute: env_parsed("RATE_LIMIT_WRITE", default_write_rate_limit())?,
        };

        Ok(Settings {
            cache,
            upstream,
            session,
            dataset,
            server,
        })
    }
}

fn require_env(name: &'static str) -> Result<String, SettingsError> {
    std::env::var(name).map_err(|_| SettingsError::MissingRequired(name))
}

fn env_or(name: &'static str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, SettingsError> {
    match std::env::var(name) {
        Ok(v) => v.parse().map_err(|_| SettingsError::InvalidValue {
            name,
            value: v,
        }),
        Err(_) => Ok(default),
    }
}

fn decode_key(b64: &str) -> Result<[u8; 32], SettingsError> {
    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|_| SettingsError::InvalidValue {
            name: "SESSION_CREDENTIAL_KEY_B64",
            value: b64.to_string(),
        })?;
    bytes.try_into().map_err(|_| SettingsError::InvalidValue {
        name: "SESSION_CREDENTIAL_KEY_B64",
        value: "(wrong length, must decode to 32 bytes)".to_string(),
    })
}
