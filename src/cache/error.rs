//! Cache error taxonomy (spec §3 "Error taxonomy", §4.2.1 "Error
//! classification").
//!
//! Grounded on the small `thiserror` enums used throughout this kind of
//! system (`CircuitBreakerError`, `GatewayError`, `DatabaseError`) —
//! one variant per failure mode, each carrying just enough context to
//! classify and render.

use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// Negative-cache error kinds, each with its own TTL (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    EmptyResult,
    RateLimited,
    TemporaryError,
    PermanentError,
    NotFound,
    CacheCorrupted,
}

impl ErrorKind {
    /// TTL for a negative cache entry of this kind.
    pub fn ttl(self) -> Duration {
        match self {
            ErrorKind::EmptyResult => Duration::from_secs(60),
            ErrorKind::RateLimited => Duration::from_secs(900),
            ErrorKind::TemporaryError => Duration::from_secs(120),
            ErrorKind::PermanentError => Duration::from_secs(1800),
            ErrorKind::NotFound => Duration::from_secs(3600),
            ErrorKind::CacheCorrupted => Duration::from_secs(60),
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            ErrorKind::EmptyResult => "EMPTY_RESULT",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::TemporaryError => "TEMPORARY_ERROR",
            ErrorKind::PermanentError => "PERMANENT_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::CacheCorrupted => "CACHE_CORRUPTED",
        }
    }

    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::EmptyResult => 200,
            ErrorKind::RateLimited => 429,
            ErrorKind::TemporaryError => 500,
            ErrorKind::PermanentError => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::CacheCorrupted => 500,
        }
    }
}

/// What a producer reports back to the facade when it fails — enough
/// to classify without the facade knowing the producer's error type.
#[derive(Debug, Clone)]
pub struct ClassifiableError {
    pub status: Option<u16>,
    pub message: String,
}

impl ClassifiableError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ClassifiableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(s) => write!(f, "upstream error (status {}): {}", s, self.message),
            None => write!(f, "upstream error: {}", self.message),
        }
    }
}

/// Classify a producer failure into a negative-cache `ErrorKind`.
///
/// Preserves only the narrowed `\b5\d{2}\b` regex. The source this spec
/// was distilled from additionally checked `msg.includes('5')` before
/// narrowing — spec.md's Open Question notes that pre-check as possibly
/// an intentional fast-path but more likely overbroad, and instructs
/// against guessing intent; it is not reproduced here.
pub fn classify_error(err: &ClassifiableError) -> ErrorKind {
    static RATE_LIMIT_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"(?i)rate.?limit|429").unwrap());
    static NOT_FOUND_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"(?i)not found|404").unwrap());
    static SERVER_ERROR_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"\b5\d{2}\b").unwrap());

    let msg = &err.message;

    if err.status == Some(429) || RATE_LIMIT_RE.is_match(msg) {
        return ErrorKind::RateLimited;
    }
    if err.status == Some(404) || NOT_FOUND_RE.is_match(msg) {
        return ErrorKind::NotFound;
    }
    if matches!(err.status, Some(s) if (500..=599).contains(&s))
        || SERVER_ERROR_RE.is_match(msg)
        || msg.contains("ECONNREFUSED")
        || msg.contains("ECONNRESET")
        || msg.contains("ETIMEDOUT")
        || msg.contains("fetch")
    {
        return ErrorKind::TemporaryError;
    }
    if matches!(err.status, Some(s) if (400..=499).contains(&s)) {
        return ErrorKind::PermanentError;
    }
    ErrorKind::TemporaryError
}

/// Whether a deserialization/format error message looks like corruption
/// (spec §4.2 "Self-healing" — substring match over the error message).
pub fn looks_like_corruption(msg: &str) -> bool {
    msg.contains("JSON") || msg.contains("parse") || msg.contains("Unexpected token")
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cached error: {kind:?}: {message}")]
    CachedError { kind: ErrorKind, message: String },

    #[error("producer failed: {0}")]
    ProducerFailed(String),

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_first() {
        assert_eq!(
            classify_error(&ClassifiableError::new(Some(429), "whatever")),
            ErrorKind::RateLimited
        );
        assert_eq!(
            classify_error(&ClassifiableError::new(Some(404), "whatever")),
            ErrorKind::NotFound
        );
        assert_eq!(
            classify_error(&ClassifiableError::new(Some(503), "whatever")),
            ErrorKind::TemporaryError
        );
        assert_eq!(
            classify_error(&ClassifiableError::new(Some(418), "teapot")),
            ErrorKind::PermanentError
        );
    }

    #[test]
    fn classifies_by_message_when_status_absent() {
        assert_eq!(
            classify_error(&ClassifiableError::new(None, "rate limit exceeded")),
            ErrorKind::RateLimited
        );
        assert_eq!(
            classify_error(&ClassifiableError::new(None, "resource not found")),
            ErrorKind::NotFound
        );
        assert_eq!(
            classify_error(&ClassifiableError::new(None, "got 502 from upstream")),
            ErrorKind::TemporaryError
        );
        assert_eq!(
            classify_error(&ClassifiableError::new(None, "ECONNRESET")),
            ErrorKind::TemporaryError
        );
    }

    #[test]
    fn defaults_to_temporary() {
        assert_eq!(
            classify_error(&ClassifiableError::new(None, "mystery failure")),
            ErrorKind::TemporaryError
        );
    }

    #[test]
    fn detects_corruption_by_substring() {
        assert!(looks_like_corruption("Unexpected token < in JSON"));
        assert!(looks_like_corruption("failed to parse envelope"));
        assert!(!looks_like_corruption("connection refused"));
    }
}
