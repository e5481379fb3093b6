//! Upstream-client error type.

use thiserror::Error;

use super::bucket::BucketError;
use super::url::UrlValidationError;
use crate::cache::CacheError;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error("circuit breaker is open")]
    BreakerOpen,

    #[error(transparent)]
    RateLimit(#[from] BucketError),

    #[error("upstream request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl UpstreamError {
    pub fn status_code(&self) -> u16 {
        match self {
            UpstreamError::InvalidUrl(_) => 400,
            UpstreamError::BreakerOpen => 503,
            UpstreamError::RateLimit(BucketError::QueueFull) => 503,
            UpstreamError::RateLimit(BucketError::Timeout) => 504,
            UpstreamError::RateLimit(BucketError::ShuttingDown) => 503,
            UpstreamError::Request(_) => 502,
            UpstreamError::Cache(CacheError::CachedError { kind, .. }) => kind.status_code(),
            UpstreamError::Cache(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            UpstreamError::InvalidUrl(_) => "INVALID_UPSTREAM_URL",
            UpstreamError::BreakerOpen => "BREAKER_OPEN",
            UpstreamError::RateLimit(BucketError::QueueFull) => "RATE_LIMIT_QUEUE_FULL",
            UpstreamError::RateLimit(BucketError::Timeout) => "RATE_LIMIT_TIMEOUT",
            UpstreamError::RateLimit(BucketError::ShuttingDown) => "DRAINING",
            UpstreamError::Request(_) => "UPSTREAM_REQUEST_FAILED",
            UpstreamError::Cache(CacheError::CachedError { kind, .. }) => kind.as_code(),
            UpstreamError::Cache(_) => "CACHE_ERROR",
        }
    }
}
