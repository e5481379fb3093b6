//! Cache envelope (spec §3 "Cache envelope").
//!
//! Modeled on `database::cache::CacheEntry<T>` (`created_at`/`ttl`/
//! `compressed` metadata wrapping an opaque value), generalized to
//! also carry a negative (error) branch and a marker
//! field so the facade can tell a wrapped entry from a foreign write
//! left over from a schema change or a different process.

use serde::{Deserialize, Serialize};

use super::error::ErrorKind;

/// Marker embedded in every envelope this crate writes. Any value read
/// back without this marker — or missing `stored_at`/`ttl` — is treated
/// as structurally invalid and self-healed (spec §4.2 "Self-healing").
pub const ENVELOPE_MARKER: &str = "catalog_addon_cache_envelope_v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub marker: String,
    /// Unix seconds.
    pub stored_at: i64,
    pub ttl_secs: u64,
    pub body: EnvelopeBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum EnvelopeBody {
    Success(serde_json::Value),
    Error {
        error_kind: ErrorKind,
        error_message: String,
    },
}

/// Freshness classification of an envelope at a point in time (spec §3
/// invariants: fresh while `now - storedAt <= ttl`, stale while `ttl <
/// now - storedAt <= 2*ttl`, expired thereafter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

impl Envelope {
    pub fn success(payload: serde_json::Value, ttl_secs: u64, now: i64) -> Self {
        Self {
            marker: ENVELOPE_MARKER.to_string(),
            stored_at: now,
            ttl_secs,
            body: EnvelopeBody::Success(payload),
        }
    }

    pub fn error(kind: ErrorKind, message: String, now: i64) -> Self {
        Self {
            marker: ENVELOPE_MARKER.to_string(),
            stored_at: now,
            ttl_secs: kind.ttl().as_secs(),
            body: EnvelopeBody::Error {
                error_kind: kind,
                error_message: message,
            },
        }
    }

    pub fn freshness(&self, now: i64) -> Freshness {
        let age = (now - self.stored_at).max(0) as u64;
        if age <= self.ttl_secs {
            Freshness::Fresh
        } else if age <= 2 * self.ttl_secs {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    /// Structural validity check used by self-healing: a foreign write
    /// missing the marker, or lacking the fields it implies, is corrupt.
    pub fn is_structurally_valid(&self) -> bool {
        self.marker == ENVELOPE_MARKER && self.ttl_secs > 0
    }

    /// Physical retention this envelope should request from the KV
    /// backend. Spec's Open Question flags the `ceil(ttl * 1.3)` figure
    /// as a historical bug: the facade must request at least `2 * ttl`
    /// so the stale window (up to `2*ttl`) is always covered, plus a
    /// margin so the backend's own `2.5*ttl` retention floor (spec §4.1)
    /// dominates in practice.
    pub fn physical_retention_secs(ttl_secs: u64) -> u64 {
        (2 * ttl_secs).max(((ttl_secs as f64) * 1.3).ceil() as u64)
    }
}

/// Is this success payload "empty" per spec §3 (null, empty list, or
/// `{results: []}`)? Drives the EMPTY_RESULT negative-cache path.
pub fn is_empty_payload(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(map) => match map.get("results") {
            Some(serde_json::Value::Array(items)) => items.is_empty(),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_boundaries() {
        let env = Envelope::success(serde_json::json!({"a": 1}), 60, 1_000);
        assert_eq!(env.freshness(1_000), Freshness::Fresh);
        assert_eq!(env.freshness(1_060), Freshness::Fresh);
        assert_eq!(env.freshness(1_061), Freshness::Stale);
        assert_eq!(env.freshness(1_120), Freshness::Stale);
        assert_eq!(env.freshness(1_121), Freshness::Expired);
    }

    #[test]
    fn empty_payload_classification() {
        assert!(is_empty_payload(&serde_json::Value::Null));
        assert!(is_empty_payload(&serde_json::json!([])));
        assert!(is_empty_payload(&serde_json::json!({"results": []})));
        assert!(!is_empty_payload(&serde_json::json!({"results": [1]})));
        assert!(!is_empty_payload(&serde_json::json!({"a": 1})));
        assert!(!is_empty_payload(&serde_json::json!([1, 2])));
    }

    #[test]
    fn physical_retention_is_at_least_double_ttl() {
        assert_eq!(Envelope::physical_retention_secs(60), 120);
        assert_eq!(Envelope::physical_retention_secs(100), 200);
    }

    #[test]
    fn rejects_foreign_writes() {
        let mut env = Envelope::success(serde_json::json!(1), 60, 0);
        env.marker = "something-else".to_string();
        assert!(!env.is_structurally_valid());
    }

    proptest::proptest! {
        /// Spec §3's freshness invariant holds for any ttl/age pair: an
        /// envelope is fresh through `ttl`, stale through `2*ttl`, and
        /// expired past that, regardless of the concrete ttl chosen.
        #[test]
        fn freshness_law_holds_for_any_ttl(ttl_secs in 1u64..100_000, age in 0u64..300_000) {
            let env = Envelope::success(serde_json::json!(null), ttl_secs, 0);
            let freshness = env.freshness(age as i64);
            let expected = if age <= ttl_secs {
                Freshness::Fresh
            } else if age <= 2 * ttl_secs {
                Freshness::Stale
            } else {
                Freshness::Expired
            };
            proptest::prop_assert_eq!(freshness, expected);
        }

        /// Spec §9's Open Question: whatever ttl is requested, the
        /// physical retention handed to the backend must never fall
        /// below `2*ttl` — the stale window's full extent.
        #[test]
        fn physical_retention_never_undershoots_two_ttl(ttl_secs in 0u64..1_000_000) {
            proptest::prop_assert!(Envelope::physical_retention_secs(ttl_secs) >= 2 * ttl_secs);
        }
    }
}
