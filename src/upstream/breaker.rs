//! Three-state circuit breaker (spec §3 "Upstream client state", §4.3
//! "Circuit breaker").
//!
//! Grounded on `api::gateway::CircuitBreaker` — same `Closed`/`Open`/
//! `HalfOpen` shape and `parking_lot::RwLock`-guarded state, generalized
//! from its fixed `success_threshold` half-open gate to the spec's
//! single-probe half-open (exactly one caller may probe; others see
//! breaker-open until it resolves), and from its total failure counter
//! to a rolling 60s failure window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    /// Timestamps of failures within the rolling window (closed state).
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    /// Whether the single half-open probe slot is currently taken.
    probe_in_flight: bool,
}

/// Rolling-window, single-probe-half-open circuit breaker.
pub struct CircuitBreaker {
    failure_threshold: usize,
    window: Duration,
    open_duration: Duration,
    inner: Mutex<Inner>,
}

/// A caller-visible permit to proceed, returned by `try_acquire`.
pub struct Permit {
    /// Set when this permit is the single half-open probe: `record_*`
    /// must be called exactly once for it.
    pub is_probe: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("circuit breaker is open")]
pub struct BreakerOpenError;

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, window: Duration, open_duration: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold as usize,
            window,
            open_duration,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Serialized state transition + admission check (spec §5: "Breaker
    /// state transitions are serialized by a single critical section").
    pub fn try_acquire(&self) -> Result<Permit, BreakerOpenError> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(Permit { is_probe: false }),
            BreakerState::Open => {
                let opened_at = inner.opened_at.expect("opened_at set whenever state is Open");
                if opened_at.elapsed() >= self.open_duration {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(Permit { is_probe: true })
                } else {
                    Err(BreakerOpenError)
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(BreakerOpenError)
                } else {
                    inner.probe_in_flight = true;
                    Ok(Permit { is_probe: true })
                }
            }
        }
    }

    pub fn record_success(&self, permit: Permit) {
        let mut inner = self.inner.lock();
        if permit.is_probe {
            tracing::info!("circuit breaker probe succeeded, closing");
            inner.state = BreakerState::Closed;
            inner.failures.clear();
            inner.opened_at = None;
            inner.probe_in_flight = false;
        } else if inner.state == BreakerState::Closed {
            self.prune_window(&mut inner);
        }
    }

    /// Releases a permit without recording a success or failure —
    /// for callers that never reached upstream at all (e.g. the token
    /// bucket rejected the request before admission). A probe permit's
    /// half-open slot is freed so a later caller can still attempt the
    /// probe; this must not be conflated with `record_failure`, which
    /// would pollute the rolling failure window with non-upstream
    /// congestion (spec §8 scenario 3 counts *upstream* failures only).
    pub fn release(&self, permit: Permit) {
        if permit.is_probe {
            let mut inner = self.inner.lock();
            if inner.state == BreakerState::HalfOpen {
                inner.probe_in_flight = false;
            }
        }
    }

    pub fn record_failure(&self, permit: Permit) {
        let mut inner = self.inner.lock();
        if permit.is_probe {
            tracing::warn!("circuit breaker probe failed, reopening");
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            inner.probe_in_flight = false;
            return;
        }

        if inner.state != BreakerState::Closed {
            return;
        }
        self.prune_window(&mut inner);
        inner.failures.push_back(Instant::now());
        if inner.failures.len() >= self.failure_threshold {
            tracing::warn!(
                failures = inner.failures.len(),
                "circuit breaker failure threshold reached, opening"
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    fn prune_window(&self, inner: &mut Inner) {
        let cutoff = Instant::now()
            .checked_sub(self.window)
            .unwrap_or_else(Instant::now);
        while matches!(inner.failures.front(), Some(t) if *t < cutoff) {
            inner.failures.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_closed_under_threshold() {
        let cb = CircuitBreaker::new(10, Duration::from_secs(60), Duration::from_secs(30));
        for _ in 0..9 {
            let permit = cb.try_acquire().unwrap();
            cb.record_failure(permit);
        }
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn opens_at_threshold_and_rejects() {
        let cb = CircuitBreaker::new(10, Duration::from_secs(60), Duration::from_secs(30));
        for _ in 0..10 {
            let permit = cb.try_acquire().unwrap();
            cb.record_failure(permit);
        }
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn half_open_allows_single_probe() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60), Duration::from_millis(10));
        for _ in 0..2 {
            let permit = cb.try_acquire().unwrap();
            cb.record_failure(permit);
        }
        assert_eq!(cb.state(), BreakerState::Open);
        std::thread::sleep(Duration::from_millis(20));

        let probe = cb.try_acquire().unwrap();
        assert!(probe.is_probe);
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        // A second caller during the same half-open window is rejected.
        assert!(cb.try_acquire().is_err());

        cb.record_success(probe);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn releasing_a_probe_permit_frees_the_slot_without_reopening() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60), Duration::from_millis(10));
        for _ in 0..2 {
            let permit = cb.try_acquire().unwrap();
            cb.record_failure(permit);
        }
        std::thread::sleep(Duration::from_millis(20));

        let probe = cb.try_acquire().unwrap();
        assert!(probe.is_probe);
        cb.release(probe);
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        // The slot is free again; a later caller can still probe.
        let probe2 = cb.try_acquire().unwrap();
        assert!(probe2.is_probe);
        cb.record_success(probe2);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(60), Duration::from_millis(10));
        let permit = cb.try_acquire().unwrap();
        cb.record_failure(permit);
        assert_eq!(cb.state(), BreakerState::Open);
        std::thread::sleep(Duration::from_millis(20));

        let probe = cb.try_acquire().unwrap();
        cb.record_failure(probe);
        assert_eq!(cb.state(), BreakerState::Open);
    }
}
