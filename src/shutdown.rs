//! Shutdown coordination (spec §5 "Shutdown").
//!
//! Grounded on the `tokio::sync` coordination primitives
//! `enterprise::cache::lock` reaches for (async-aware shared state
//! guarded by channels rather than ad-hoc flags). A `watch` channel is
//! the natural fit here: many independent tasks (token-bucket waiters,
//! the dataset refresh timer, in-flight `wrap` producers) each need to
//! observe a single "draining" transition without polling.

use tokio::sync::watch;

/// Handle for triggering a graceful shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Handle for observing the shutdown signal.
#[derive(Clone)]
pub struct ShutdownWatch {
    rx: watch::Receiver<bool>,
}

/// Construct a linked (trigger, observer) pair.
pub fn channel() -> (ShutdownHandle, ShutdownWatch) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownWatch { rx })
}

impl ShutdownHandle {
    /// Begin draining: new requests should return 503, in-flight
    /// requests get a bounded grace period, and waiters are rejected.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl ShutdownWatch {
    pub fn is_draining(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a shutdown has been triggered.
    pub async fn draining(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
