//! Upstream HTTP client (C3): composes URL safety, the circuit breaker,
//! the token bucket, the retry loop, and the cache facade into the
//! single `fetch` entry point described by spec §4.3's diagram.
//!
//! Grounded on `api::gateway::Gateway::proxy_request` (validate target,
//! consult the breaker, rate-limit, send, retry), generalized to route
//! every attempt through the cache facade instead of a direct
//! pass-through proxy.
//!
//! **Design note on breaker placement.** The diagram in spec §4.3 draws
//! the breaker check ahead of the cache wrap for every call. Taken
//! literally, that would let an open breaker block even a pure cache
//! hit, and would let a single call that turns out to be a cache hit
//! consume the one half-open probe slot without ever exercising
//! upstream (leaving the breaker stuck half-open). Instead, the breaker
//! check lives as the first action inside the producer passed to
//! `CacheFacade::wrap`: a pure hit never invokes the producer at all
//! (matching the literal wording of the invariant in spec §8 — "breaker
//! in Open state never invokes the producer"), and a half-open probe is
//! claimed only by whichever call actually causes a production attempt
//! (a genuine miss, or a stale-while-revalidate background refresh),
//! which is exactly the caller that can resolve it. One accepted
//! deviation: since the facade always cache-writes a producer's error,
//! a breaker-open (or token-bucket) rejection on a cold key still
//! produces a negative cache entry, instead of the "no cache write"
//! spec §7 describes for that case; `fetch` detects the marker message
//! and still surfaces the correct `BreakerOpen`/`RateLimit` error and
//! status code to its caller. A token-bucket rejection never reaches
//! the breaker's failure window at all (see `produce`'s comment on
//! `breaker.release`): only the outcome of an actual HTTP attempt may
//! move the breaker toward Open.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use super::breaker::CircuitBreaker;
use super::bucket::{BucketError, TokenBucket};
use super::error::UpstreamError;
use super::retry::{parse_retry_after, with_retry, AttemptFailure};
use super::url::validate;
use crate::cache::{CacheError, CacheFacade, ClassifiableError, WrapOptions};
use crate::metrics::Counters;
use crate::settings::UpstreamSettings;
use crate::shutdown::ShutdownWatch;

const BREAKER_OPEN_MARKER: &str = "circuit breaker is open";

/// Marker prefix threading a `BucketError` variant through the cache
/// facade's `ClassifiableError` (which only carries a status/message
/// pair): `fetch` parses it back out to reconstruct the exact
/// `UpstreamError::RateLimit` variant instead of collapsing every
/// bucket rejection into a generic request error.
const BUCKET_ERROR_MARKER_PREFIX: &str = "token bucket rejected request: ";

fn bucket_error_marker(err: BucketError) -> String {
    format!("{BUCKET_ERROR_MARKER_PREFIX}{err:?}")
}

fn parse_bucket_error_marker(message: &str) -> Option<BucketError> {
    let tag = message.strip_prefix(BUCKET_ERROR_MARKER_PREFIX)?;
    match tag {
        "QueueFull" => Some(BucketError::QueueFull),
        "Timeout" => Some(BucketError::Timeout),
        "ShuttingDown" => Some(BucketError::ShuttingDown),
        _ => None,
    }
}

/// Rate-limited, circuit-broken client for the upstream metadata API.
pub struct UpstreamClient {
    http: reqwest::Client,
    cache: Arc<CacheFacade>,
    breaker: Arc<CircuitBreaker>,
    bucket: Arc<TokenBucket>,
    counters: Arc<Counters>,
    base_url: Url,
    allowed_hosts: Vec<String>,
    api_key: String,
    request_timeout: Duration,
    shutdown: ShutdownWatch,
}

impl UpstreamClient {
    pub fn new(
        settings: &UpstreamSettings,
        cache: Arc<CacheFacade>,
        counters: Arc<Counters>,
        shutdown: ShutdownWatch,
    ) -> Result<Self, UpstreamError> {
        let base_url = validate(&settings.base_url, &settings.allowed_hosts)?;
        let breaker = Arc::new(CircuitBreaker::new(
            settings.breaker_failure_threshold,
            settings.breaker_window,
            settings.breaker_open_duration,
        ));
        let bucket = Arc::new(TokenBucket::new(
            settings.bucket_capacity,
            settings.requests_per_second,
            settings.waiter_queue_bound,
        ));
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        Ok(Self {
            http,
            cache,
            breaker,
            bucket,
            counters,
            base_url,
            allowed_hosts: settings.allowed_hosts.clone(),
            api_key: settings.api_key.clone(),
            request_timeout: settings.request_timeout,
            shutdown,
        })
    }

    pub fn breaker_state(&self) -> super::breaker::BreakerState {
        self.breaker.state()
    }

    fn build_url(&self, endpoint: &str, params: &[(String, String)]) -> Result<Url, UpstreamError> {
        let mut url = self
            .base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| UpstreamError::Request(format!("invalid endpoint {endpoint}: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            for (k, v) in params {
                query.append_pair(k, v);
            }
            query.append_pair("api_key", &self.api_key);
        }
        validate(url.as_str(), &self.allowed_hosts)?;
        Ok(url)
    }

    fn cache_key(endpoint: &str, params: &[(String, String)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort();
        let query = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("upstream:{endpoint}?{query}")
    }

    /// Fetch `endpoint` with `params`, through the cache facade, with
    /// the caller-provided freshness `ttl` (spec §4.3 `fetch` contract).
    pub async fn fetch(
        &self,
        endpoint: &str,
        params: &[(String, String)],
        ttl: Duration,
    ) -> Result<Value, UpstreamError> {
        let url = self.build_url(endpoint, params)?;
        let key = Self::cache_key(endpoint, params);

        let http = self.http.clone();
        let breaker = Arc::clone(&self.breaker);
        let bucket = Arc::clone(&self.bucket);
        let counters = Arc::clone(&self.counters);
        let mut shutdown = self.shutdown.clone();
        let timeout = self.request_timeout;

        let result = self
            .cache
            .wrap(&key, ttl, WrapOptions::default(), move || async move {
                produce(url, http, breaker, bucket, counters, &mut shutdown, timeout).await
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                if let CacheError::CachedError { ref message, .. } = err {
                    if message == BREAKER_OPEN_MARKER {
                        return Err(UpstreamError::BreakerOpen);
                    }
                    if let Some(bucket_err) = parse_bucket_error_marker(message) {
                        return Err(UpstreamError::RateLimit(bucket_err));
                    }
                }
                Err(UpstreamError::from(err))
            }
        }
    }
}

/// The producer passed to `CacheFacade::wrap`: breaker admission, then
/// token-bucket acquire, then the retry-wrapped HTTP GET (spec §4.3
/// "URL validate -> quota/breaker check -> cache wrap -> token-bucket
/// acquire -> HTTP GET + retry loop").
async fn produce(
    url: Url,
    http: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
    bucket: Arc<TokenBucket>,
    counters: Arc<Counters>,
    shutdown: &mut ShutdownWatch,
    timeout: Duration,
) -> Result<Value, ClassifiableError> {
    let permit = breaker.try_acquire().map_err(|_| {
        counters.breaker_rejection();
        ClassifiableError::new(None, BREAKER_OPEN_MARKER)
    })?;

    if let Err(err) = bucket.acquire(shutdown).await {
        counters.bucket_timeout();
        // This call never reached upstream, so it must not count
        // against the breaker's rolling failure window (spec §8
        // scenario 3 is scoped to upstream failures); just free the
        // permit, including the half-open probe slot if this happened
        // to be the probe.
        breaker.release(permit);
        tracing::warn!(error = %err, url = %redact(&url), "token bucket rejected upstream request");
        return Err(ClassifiableError::new(None, bucket_error_marker(err)));
    }

    let outcome = with_retry(|attempt| {
        let http = http.clone();
        let url = url.clone();
        async move { send_once(&http, &url, attempt, timeout).await }
    })
    .await;

    match &outcome {
        Ok(_) => breaker.record_success(permit),
        Err(_) => breaker.record_failure(permit),
    }
    outcome
}

async fn send_once(
    http: &reqwest::Client,
    url: &Url,
    attempt: u32,
    timeout: Duration,
) -> Result<Value, (ClassifiableError, AttemptFailure)> {
    tracing::debug!(attempt, url = %redact(url), "sending upstream request");

    let response = match tokio::time::timeout(timeout, http.get(url.clone()).send()).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(err)) => {
            let message = if err.is_timeout() {
                "upstream request timed out (ETIMEDOUT)".to_string()
            } else if err.is_connect() {
                format!("upstream connection failed (ECONNREFUSED): {err}")
            } else {
                format!("upstream request failed: {err}")
            };
            return Err((
                ClassifiableError::new(None, message),
                AttemptFailure { retryable: true, retry_after: None },
            ));
        }
        Err(_) => {
            return Err((
                ClassifiableError::new(None, "upstream request timed out (ETIMEDOUT)".to_string()),
                AttemptFailure { retryable: true, retry_after: None },
            ));
        }
    };

    let status = response.status().as_u16();

    if status == 404 {
        return Err((
            ClassifiableError::new(Some(404), "upstream returned 404".to_string()),
            AttemptFailure { retryable: false, retry_after: None },
        ));
    }

    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err((
            ClassifiableError::new(Some(429), "upstream rate limited (429)".to_string()),
            AttemptFailure { retryable: true, retry_after },
        ));
    }

    if (500..=599).contains(&status) {
        return Err((
            ClassifiableError::new(Some(status), format!("upstream returned {status}")),
            AttemptFailure { retryable: true, retry_after: None },
        ));
    }

    if !(200..=299).contains(&status) {
        return Err((
            ClassifiableError::new(Some(status), format!("upstream returned {status}")),
            AttemptFailure { retryable: false, retry_after: None },
        ));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| {
            (
                ClassifiableError::new(None, format!("failed to parse upstream JSON: {e}")),
                AttemptFailure { retryable: false, retry_after: None },
            )
        })
}

/// Redact the credential query parameter before it ever reaches a log
/// line (spec §4.3 "redacted in every log record").
fn redact(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = redacted
        .query_pairs()
        .map(|(k, v)| {
            if k == "api_key" {
                (k.into_owned(), "***".to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(&pairs);
    redacted.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_order_independent() {
        let a = UpstreamClient::cache_key("movie/1", &[("k".into(), "v".into()), ("a".into(), "b".into())]);
        let b = UpstreamClient::cache_key("movie/1", &[("a".into(), "b".into()), ("k".into(), "v".into())]);
        assert_eq!(a, b);
    }

    #[test]
    fn bucket_error_marker_round_trips_every_variant() {
        for err in [BucketError::QueueFull, BucketError::Timeout, BucketError::ShuttingDown] {
            let marker = bucket_error_marker(err);
            assert_eq!(parse_bucket_error_marker(&marker), Some(err));
        }
    }

    #[test]
    fn unrelated_messages_do_not_parse_as_bucket_errors() {
        assert_eq!(parse_bucket_error_marker("upstream returned 500"), None);
        assert_eq!(parse_bucket_error_marker(BREAKER_OPEN_MARKER), None);
    }

    #[test]
    fn redact_hides_api_key_only() {
        let url = Url::parse("https://api.example.com/movie/1?api_key=secret123&language=en").unwrap();
        let redacted = redact(&url);
        assert!(!redacted.contains("secret123"));
        assert!(redacted.contains("language=en"));
    }
}
