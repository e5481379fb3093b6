//! # catalog-addon-core
//!
//! Upstream-integration core for a catalog-serving addon: a resilient
//! cache facade, a rate-limited and circuit-broken upstream client, a
//! per-user configuration resolver, and a bulk external-dataset engine.
//!
//! ## Architecture
//!
//! - `cache`: KV backend (C1) and cache facade (C2) — stale-while-revalidate,
//!   error-typed negative caching, request coalescing, self-healing.
//! - `upstream`: rate-limited, circuit-broken upstream HTTP client (C3).
//! - `user_config`: per-user configuration resolver (C4) — LRU cache,
//!   single-flight loading, credential unwrap, ownership checks.
//! - `dataset`: bulk external-dataset ingestor and in-memory catalog
//!   index (C5).
//! - `http`: thin addon-protocol and config-API route scaffolding that
//!   wires the above together (no resilience logic of its own).
//! - `settings`, `metrics`, `shutdown`: ambient stack shared by every
//!   component.

#![warn(clippy::all)]

pub mod cache;
pub mod dataset;
pub mod error;
pub mod http;
pub mod metrics;
pub mod settings;
pub mod shutdown;
pub mod upstream;
pub mod user_config;

pub use error::{CoreError, CoreResult};

/// Crate version, re-exported for `/health` and `/api/status` responses.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
