//! Per-IP rate limiting middleware (spec §6 "Rate limits": 300 req/min
//! global, 1000 req/min on addon routes, 60 req/min on auth and write
//! routes).
//!
//! Grounded on the same elapsed-time token-bucket arithmetic as
//! `upstream::bucket`'s `TokenBucket` (itself carried over from
//! `enterprise::ratelimit::algorithm::TokenBucket`), but rejecting
//! immediately on empty rather than queuing a waiter: there is no
//! caller here worth making wait, unlike the upstream quota gate.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::responses::ApiError;
use super::state::AppState;

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(per_minute: u32) -> Self {
        let capacity = per_minute.max(1) as f64;
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            self.last_refill = now;
        }
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Which per-IP quota a request draws from, on top of the global one
/// every request draws from (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteClass {
    Addon,
    Write,
    Other,
}

fn classify(method: &Method, path: &str) -> RouteClass {
    if path.starts_with("/api/auth/") || (method != Method::GET && path.starts_with("/api/")) {
        RouteClass::Write
    } else if path == "/health" || path == "/ready" || path == "/metrics" || path.starts_with("/api/") {
        RouteClass::Other
    } else {
        // Everything else is the `/{userId}/...` addon protocol surface.
        RouteClass::Addon
    }
}

/// Three independent per-IP buckets (global + one per route class),
/// keyed by client address. Bounded only by IP churn, the way the
/// teacher's own connection-tracking maps are; entries are cheap
/// (a handful of floats) and never explicitly evicted.
pub struct PerIpLimiter {
    global: DashMap<IpAddr, Mutex<Bucket>>,
    addon: DashMap<IpAddr, Mutex<Bucket>>,
    write: DashMap<IpAddr, Mutex<Bucket>>,
    global_per_minute: u32,
    addon_per_minute: u32,
    write_per_minute: u32,
}

impl PerIpLimiter {
    pub fn new(global_per_minute: u32, addon_per_minute: u32, write_per_minute: u32) -> Self {
        Self {
            global: DashMap::new(),
            addon: DashMap::new(),
            write: DashMap::new(),
            global_per_minute,
            addon_per_minute,
            write_per_minute,
        }
    }

    fn take(map: &DashMap<IpAddr, Mutex<Bucket>>, ip: IpAddr, per_minute: u32) -> bool {
        map.entry(ip).or_insert_with(|| Mutex::new(Bucket::new(per_minute))).lock().try_take()
    }

    /// `false` means the request should be rejected with 429.
    fn admit(&self, ip: IpAddr, class: RouteClass) -> bool {
        if !Self::take(&self.global, ip, self.global_per_minute) {
            return false;
        }
        match class {
            RouteClass::Addon => Self::take(&self.addon, ip, self.addon_per_minute),
            RouteClass::Write => Self::take(&self.write, ip, self.write_per_minute),
            RouteClass::Other => true,
        }
    }
}

/// Middleware entry point. Requires the router to be served via
/// `into_make_service_with_connect_info::<SocketAddr>()` so the
/// `ConnectInfo` extractor has a client address to key on.
pub async fn enforce(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let class = classify(request.method(), request.uri().path());
    if !state.rate_limiter.admit(addr.ip(), class) {
        return Err(ApiError::new(429, "rate limit exceeded", Some("RATE_LIMITED")).with_retry_after(60));
    }
    Ok(next.run(request).await)
}

pub fn shared(global_per_minute: u32, addon_per_minute: u32, write_per_minute: u32) -> Arc<PerIpLimiter> {
    Arc::new(PerIpLimiter::new(global_per_minute, addon_per_minute, write_per_minute))
}
