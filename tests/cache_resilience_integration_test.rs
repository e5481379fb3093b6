// Integration tests for the cache facade driven together with the
// circuit breaker and error taxonomy it fronts for upstream calls.

#[cfg(test)]
mod cache_resilience_integration_tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use catalog_addon_core::cache::{
        CacheError, CacheFacade, CacheLookup, ClassifiableError, ErrorKind, InMemoryKv, KvBackend, WrapOptions,
    };
    use catalog_addon_core::metrics::Counters;
    use catalog_addon_core::upstream::{BreakerState, CircuitBreaker};

    fn facade() -> Arc<CacheFacade> {
        let counters = Arc::new(Counters::new());
        let backend = Arc::new(InMemoryKv::new(64, counters.clone()));
        Arc::new(CacheFacade::new(backend, "v1", counters))
    }

    #[tokio::test]
    async fn breaker_trips_then_negative_cache_shields_further_producer_calls() {
        let cache = facade();
        let breaker = Arc::new(CircuitBreaker::new(3, Duration::from_secs(60), Duration::from_secs(300)));
        let attempts = Arc::new(AtomicU64::new(0));

        // Three failing calls trip the breaker open.
        for i in 0..3 {
            let breaker = breaker.clone();
            let attempts = attempts.clone();
            let key = format!("title/{i}");
            let result = cache
                .wrap(&key, Duration::from_secs(60), WrapOptions::default(), move || async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    let permit = breaker.try_acquire().map_err(|_| ClassifiableError::new(None, "breaker open"))?;
                    breaker.record_failure(permit);
                    Err(ClassifiableError::new(Some(503), "upstream returned 503"))
                })
                .await;
            assert!(matches!(
                result,
                Err(CacheError::CachedError { kind: ErrorKind::TemporaryError, .. })
            ));
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        // A fourth call against a brand new key still finds the breaker
        // open before ever touching the negative cache for that key.
        let breaker2 = breaker.clone();
        let attempts2 = attempts.clone();
        let rejected = cache
            .wrap("title/3", Duration::from_secs(60), WrapOptions::default(), move || async move {
                attempts2.fetch_add(1, Ordering::SeqCst);
                breaker2
                    .try_acquire()
                    .map(|_| serde_json::json!(null))
                    .map_err(|_| ClassifiableError::new(None, "breaker open"))
            })
            .await;
        assert!(rejected.is_err());
        // The producer did run once (to observe the open breaker) but
        // the rejection is now cached, so a second read never invokes
        // the producer again.
        assert_eq!(attempts.load(Ordering::SeqCst), 4);

        let second = cache
            .wrap("title/3", Duration::from_secs(60), WrapOptions::default(), || async move {
                panic!("producer must not run while the negative entry is fresh");
            })
            .await;
        assert!(second.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn stale_hit_triggers_background_refresh_that_refreshes_the_entry() {
        let counters = Arc::new(Counters::new());
        let backend = Arc::new(InMemoryKv::new(64, counters.clone()));
        let cache = Arc::new(CacheFacade::new(backend.clone(), "v1", counters));

        // Write an envelope whose `stored_at` already sits past its ttl
        // but within the 2x stale window, rather than sleeping past a
        // real ttl boundary — deterministic instead of timing-dependent.
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let stale_envelope = catalog_addon_core::cache::Envelope::success(
            serde_json::json!({"title": "Arrival"}),
            10,
            now - 15,
        );
        backend
            .set(
                "v1:movie/1",
                serde_json::to_vec(&stale_envelope).unwrap(),
                Duration::from_secs(60),
            )
            .await;

        match cache.get_entry("movie/1").await {
            CacheLookup::Stale(payload) => assert_eq!(payload, serde_json::json!({"title": "Arrival"})),
            other => panic!("expected a stale hit, got {other:?}"),
        }

        let refreshed = cache
            .wrap("movie/1", Duration::from_secs(60), WrapOptions::default(), || async move {
                Ok(serde_json::json!({"title": "Arrival", "refreshed": true}))
            })
            .await
            .unwrap();
        // The stale payload is returned immediately to this caller...
        assert_eq!(refreshed, serde_json::json!({"title": "Arrival"}));

        // ...while the background refresh it triggered lands shortly
        // after, fully replacing the entry with a fresh one.
        tokio::time::sleep(Duration::from_millis(50)).await;
        match cache.get_entry("movie/1").await {
            CacheLookup::Fresh(payload) => {
                assert_eq!(payload, serde_json::json!({"title": "Arrival", "refreshed": true}))
            }
            other => panic!("expected the background refresh to have landed fresh, got {other:?}"),
        }
    }
}
