//! Exponential backoff retry loop (spec §4.3 "Retry loop").
//!
//! Grounded on `api::gateway::RetryPolicy::execute` (attempt-counted
//! loop, exponential delay, `tokio::time::sleep` between attempts),
//! simplified to a fixed `300ms * 2^attempt` schedule with no jitter and
//! an explicit `Retry-After` override, rather than a jitter +
//! configurable multiplier.

use std::time::Duration;

const BASE_DELAY: Duration = Duration::from_millis(300);
const MAX_RETRIES: u32 = 3;
const RETRY_AFTER_CAP: Duration = Duration::from_secs(10);

/// What the retry loop needs to know about a failed attempt.
pub struct AttemptFailure {
    pub retryable: bool,
    pub retry_after: Option<Duration>,
}

/// Run `op` up to `MAX_RETRIES` additional times on retryable failures.
///
/// `op` returns `Ok(T)` on success or `Err((E, AttemptFailure))` on
/// failure; non-retryable failures and the final retryable failure both
/// propagate `E` to the caller.
pub async fn with_retry<F, Fut, T, E>(mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, (E, AttemptFailure)>>,
{
    let mut attempt = 0u32;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err((err, failure)) => {
                if !failure.retryable || attempt >= MAX_RETRIES {
                    return Err(err);
                }
                let delay = failure
                    .retry_after
                    .map(|d| d.min(RETRY_AFTER_CAP))
                    .unwrap_or_else(|| BASE_DELAY * 2u32.pow(attempt));
                tracing::warn!(attempt, ?delay, "upstream request failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Parse a `Retry-After` header value (seconds, or an HTTP date — only
/// the seconds form is expected from upstream and is all this handles).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ()> = with_retry(|_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_max_then_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = with_retry(|_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err((
                    "boom",
                    AttemptFailure {
                        retryable: true,
                        retry_after: Some(Duration::from_millis(1)),
                    },
                ))
            }
        })
        .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }

    #[tokio::test]
    async fn non_retryable_failure_aborts_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = with_retry(|_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err((
                    "bad request",
                    AttemptFailure {
                        retryable: false,
                        retry_after: None,
                    },
                ))
            }
        })
        .await;
        assert_eq!(result, Err("bad request"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_after_seconds_parses() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after("not-a-number"), None);
    }
}
