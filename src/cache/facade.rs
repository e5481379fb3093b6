//! Cache facade (C2): wraps the KV backend with the envelope metadata,
//! error classification, stale-while-revalidate, request coalescing,
//! and self-healing described in spec §4.2.
//!
//! The single-flight map is the "owner-or-waiter" primitive spec §9
//! asks for — a per-key future handle rather than ad-hoc mutex and
//! condition variable — grounded on the `DashMap`-keyed coordination
//! style in `enterprise::cache::lock::DistributedMutex`, built here on
//! `tokio::sync::OnceCell` instead of a bespoke lock table, since a
//! one-shot cell is exactly the shape a single producer result needs.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::OnceCell;

use super::envelope::{is_empty_payload, Envelope, EnvelopeBody, Freshness};
use super::error::{classify_error, looks_like_corruption, CacheError, ClassifiableError, ErrorKind};
use super::kv::KvBackend;
use crate::metrics::Counters;

/// What a lookup against the backend resolves to.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Missing,
    Fresh(serde_json::Value),
    Stale(serde_json::Value),
    Negative { kind: ErrorKind, message: String },
}

/// Options for `wrap`.
#[derive(Debug, Clone, Copy)]
pub struct WrapOptions {
    pub allow_stale: bool,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self { allow_stale: true }
    }
}

type ProducerResult = Result<serde_json::Value, ClassifiableError>;

pub struct CacheFacade {
    backend: Arc<dyn KvBackend>,
    version: String,
    in_flight: DashMap<String, Arc<OnceCell<ProducerResult>>>,
    counters: Arc<Counters>,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl CacheFacade {
    pub fn new(backend: Arc<dyn KvBackend>, version: impl Into<String>, counters: Arc<Counters>) -> Self {
        Self {
            backend,
            version: version.into(),
            in_flight: DashMap::new(),
            counters,
        }
    }

    fn versioned_key(&self, key: &str) -> String {
        format!("{}:{}", self.version, key)
    }

    /// Read the raw envelope behind `key`, self-healing corruption.
    pub async fn get_entry(&self, key: &str) -> CacheLookup {
        let vkey = self.versioned_key(key);
        let raw = match self.backend.get(&vkey).await {
            Some(raw) => raw,
            None => return CacheLookup::Missing,
        };

        let envelope: Envelope = match serde_json::from_slice(&raw) {
            Ok(env) => env,
            Err(err) => return self.self_heal(&vkey, &err.to_string()).await,
        };

        if !envelope.is_structurally_valid() {
            return self.self_heal(&vkey, "missing storedAt/ttl or marker").await;
        }

        let freshness = envelope.freshness(now_unix());
        match (freshness, envelope.body) {
            (Freshness::Expired, _) => CacheLookup::Missing,
            (Freshness::Fresh, EnvelopeBody::Success(payload)) => CacheLookup::Fresh(payload),
            (Freshness::Stale, EnvelopeBody::Success(payload)) => CacheLookup::Stale(payload),
            (_, EnvelopeBody::Error { error_kind, error_message }) => CacheLookup::Negative {
                kind: error_kind,
                message: error_message,
            },
        }
    }

    async fn self_heal(&self, vkey: &str, err_msg: &str) -> CacheLookup {
        // Per spec §4.2, parse-error detection is by substring match;
        // any structural failure is treated the same way regardless —
        // delete the key and write a fresh CACHE_CORRUPTED marker.
        let _ = looks_like_corruption(err_msg);
        self.backend.delete(vkey).await;
        self.counters.corrupted_entry();
        let kind = ErrorKind::CacheCorrupted;
        let envelope = Envelope::error(kind, err_msg.to_string(), now_unix());
        if let Ok(bytes) = serde_json::to_vec(&envelope) {
            self.backend
                .set(vkey, bytes, Duration::from_secs(Envelope::physical_retention_secs(kind.ttl().as_secs())))
                .await;
        }
        CacheLookup::Missing
    }

    /// Unwrapped successful payload, or `None` on miss/stale/negative.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.get_entry(key).await {
            CacheLookup::Fresh(v) => serde_json::from_value(v).ok(),
            _ => None,
        }
    }

    /// Wrap and write a successful payload with the given TTL.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let payload = serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.write_success(key, payload, ttl.as_secs()).await;
        Ok(())
    }

    async fn write_success(&self, key: &str, payload: serde_json::Value, ttl_secs: u64) {
        let vkey = self.versioned_key(key);
        let envelope = Envelope::success(payload, ttl_secs, now_unix());
        if let Ok(bytes) = serde_json::to_vec(&envelope) {
            self.backend
                .set(&vkey, bytes, Duration::from_secs(Envelope::physical_retention_secs(ttl_secs)))
                .await;
        }
    }

    /// Write a negative entry with the taxonomy's TTL for `kind`.
    pub async fn set_error(&self, key: &str, kind: ErrorKind, message: impl Into<String>) {
        let vkey = self.versioned_key(key);
        let envelope = Envelope::error(kind, message.into(), now_unix());
        if let Ok(bytes) = serde_json::to_vec(&envelope) {
            self.backend
                .set(&vkey, bytes, Duration::from_secs(Envelope::physical_retention_secs(kind.ttl().as_secs())))
                .await;
        }
    }

    pub async fn delete(&self, key: &str) {
        self.backend.delete(&self.versioned_key(key)).await;
    }

    /// Primary entry point: cache-lookup-then-produce with coalescing
    /// (spec §4.2 "Wrap algorithm"). Takes `self` as an `Arc` because a
    /// stale hit schedules a detached background refresh that must
    /// outlive the calling request.
    pub async fn wrap<F, Fut>(
        self: &Arc<Self>,
        key: &str,
        ttl: Duration,
        options: WrapOptions,
        producer: F,
    ) -> Result<serde_json::Value, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ProducerResult> + Send + 'static,
    {
        match self.get_entry(key).await {
            CacheLookup::Fresh(payload) => {
                self.counters.hit();
                Ok(payload)
            }
            CacheLookup::Negative { kind, message } => {
                self.counters.cached_error();
                Err(CacheError::CachedError { kind, message })
            }
            CacheLookup::Stale(payload) => {
                self.counters.stale_served();
                if options.allow_stale && !self.in_flight.contains_key(key) {
                    self.spawn_background_refresh(key, ttl, producer);
                }
                Ok(payload)
            }
            CacheLookup::Missing => {
                self.counters.miss();
                self.produce_or_join(key, ttl, producer()).await
            }
        }
    }

    fn spawn_background_refresh<F, Fut>(self: &Arc<Self>, key: &str, ttl: Duration, producer: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ProducerResult> + Send + 'static,
    {
        // Fire-and-forget: failures log only (spec §4.2 step 4).
        let this = Arc::clone(self);
        let key = key.to_string();
        let fut = producer();
        tokio::spawn(async move {
            if let Err(err) = this.produce_or_join(&key, ttl, fut).await {
                tracing::warn!(key, error = %err, "background stale-while-revalidate refresh failed");
            }
        });
    }

    async fn produce_or_join(
        &self,
        key: &str,
        ttl: Duration,
        fut: impl Future<Output = ProducerResult>,
    ) -> Result<serde_json::Value, CacheError> {
        let (cell, is_owner) = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(e) => (e.get().clone(), false),
            Entry::Vacant(e) => {
                let cell = Arc::new(OnceCell::new());
                e.insert(cell.clone());
                (cell, true)
            }
        };

        if is_owner {
            self.counters.in_flight_inc();
        } else {
            self.counters.deduplicated();
        }

        let result = cell
            .get_or_init(|| async {
                let result = fut.await;
                self.handle_producer_result(key, ttl, &result).await;
                result
            })
            .await
            .clone();

        if is_owner {
            self.counters.in_flight_dec();
            self.in_flight.remove_if(key, |_, v| Arc::ptr_eq(v, &cell));
        }

        result.map_err(|e| {
            let kind = classify_error(&e);
            CacheError::CachedError { kind, message: e.message }
        })
    }

    async fn handle_producer_result(&self, key: &str, ttl: Duration, result: &ProducerResult) {
        match result {
            Ok(payload) if is_empty_payload(payload) => {
                self.write_success(key, payload.clone(), ErrorKind::EmptyResult.ttl().as_secs()).await;
            }
            Ok(payload) => {
                self.write_success(key, payload.clone(), ttl.as_secs()).await;
            }
            Err(e) => {
                self.counters.error();
                let kind = classify_error(e);
                self.set_error(key, kind, e.message.clone()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::kv::InMemoryKv;

    fn facade() -> Arc<CacheFacade> {
        let counters = Arc::new(Counters::new());
        let backend = Arc::new(InMemoryKv::new(64, counters.clone()));
        Arc::new(CacheFacade::new(backend, "v1", counters))
    }

    #[tokio::test]
    async fn wrap_caches_success_on_miss() {
        let facade = facade();
        let calls = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let c = calls.clone();
        let result = facade
            .wrap("key", Duration::from_secs(60), WrapOptions::default(), move || {
                c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move { Ok(serde_json::json!({"ok": true})) }
            })
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let second = facade
            .wrap("key", Duration::from_secs(60), WrapOptions::default(), || async move {
                panic!("producer should not run on a fresh hit");
            })
            .await
            .unwrap();
        assert_eq!(second, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn wrap_caches_negative_result() {
        let facade = facade();
        let err = facade
            .wrap("key", Duration::from_secs(60), WrapOptions::default(), || async move {
                Err(ClassifiableError::new(Some(404), "not found"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::CachedError { kind: ErrorKind::NotFound, .. }));

        let second = facade
            .wrap("key", Duration::from_secs(60), WrapOptions::default(), || async move {
                panic!("producer should not run on a cached negative");
            })
            .await
            .unwrap_err();
        assert!(matches!(second, CacheError::CachedError { kind: ErrorKind::NotFound, .. }));
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_into_one_producer_call() {
        let facade = facade();
        let calls = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let facade = facade.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                facade
                    .wrap("shared", Duration::from_secs(60), WrapOptions::default(), move || {
                        calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        async move {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(serde_json::json!(42))
                        }
                    })
                    .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), serde_json::json!(42));
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_success_payload_gets_empty_result_ttl() {
        let facade = facade();
        let _ = facade
            .wrap("key", Duration::from_secs(3600), WrapOptions::default(), || async move {
                Ok(serde_json::json!({"results": []}))
            })
            .await
            .unwrap();

        // The entry should read back as fresh immediately (EMPTY_RESULT
        // ttl is 60s, well within test execution time).
        match facade.get_entry("key").await {
            CacheLookup::Fresh(payload) => assert_eq!(payload, serde_json::json!({"results": []})),
            other => panic!("expected fresh empty payload, got {other:?}"),
        }
    }
}
