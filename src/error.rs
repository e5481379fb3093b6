//! Crate-wide error type.
//!
//! Each component defines its own focused error enum (`cache::CacheError`,
//! `upstream::UpstreamError`, `user_config::ConfigError`,
//! `dataset::DatasetError`); this top-level `CoreError` is for callers —
//! chiefly the `http` handlers — that need to flatten errors from more
//! than one component into a single HTTP response.

use thiserror::Error;

use crate::cache::CacheError;
use crate::dataset::DatasetError;
use crate::upstream::UpstreamError;
use crate::user_config::ConfigError;

/// Crate-wide result alias.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Flattened error type spanning all components.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("service is draining")]
    Draining,
}

impl CoreError {
    /// HTTP status code this error should surface as, per spec §6/§7.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::Cache(CacheError::CachedError { kind, .. }) => kind.status_code(),
            CoreError::Cache(_) => 500,
            CoreError::Upstream(e) => e.status_code(),
            CoreError::Config(e) => e.status_code(),
            CoreError::Dataset(_) => 500,
            CoreError::Validation(_) => 400,
            CoreError::Unauthorized => 401,
            CoreError::Forbidden(_) => 403,
            CoreError::Draining => 503,
        }
    }

    /// Machine-readable error code, for the `{error, code}` JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Cache(CacheError::CachedError { kind, .. }) => kind.as_code(),
            CoreError::Cache(_) => "CACHE_ERROR",
            CoreError::Upstream(e) => e.code(),
            CoreError::Config(e) => e.code(),
            CoreError::Dataset(_) => "DATASET_ERROR",
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::Unauthorized => "UNAUTHORIZED",
            CoreError::Forbidden(_) => "OWNERSHIP_MISMATCH",
            CoreError::Draining => "DRAINING",
        }
    }
}
