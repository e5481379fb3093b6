//! HTTP error envelope (spec §6 "Exit codes and error responses").
//!
//! `api::responses::ApiError` follows RFC 7807 Problem Details with a
//! type URI, title, instance, and field-error list. Spec §6 pins the
//! wire shape to a flat `{error, code?}` instead, so this keeps the
//! same `IntoResponse` plumbing — status derived from the error,
//! `Json(self)` as the body — without the extra fields the flat shape
//! doesn't need.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::CoreError;

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: u16, error: impl Into<String>, code: Option<&'static str>) -> Self {
        Self {
            status,
            error: error.into(),
            code: code.map(str::to_string),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let retry_after = matches!(err, CoreError::Cache(crate::cache::CacheError::CachedError { kind: crate::cache::ErrorKind::RateLimited, .. }))
            .then_some(900);
        let mut api_err = ApiError::new(err.status_code(), err.to_string(), Some(err.code()));
        if let Some(seconds) = retry_after {
            api_err = api_err.with_retry_after(seconds);
        }
        api_err
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
