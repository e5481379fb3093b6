//! KV backend (C1): a flat key to opaque-blob store with per-entry TTL,
//! behind one contract with two interchangeable implementations.
//!
//! The in-process variant is grounded on `database::cache`'s L1 tier
//! sizing/eviction approach; the networked variant mirrors its L3
//! Redis tier, down to the "fail soft, never cascade" policy documented
//! there for connection loss.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;

use crate::metrics::Counters;

/// Contract both KV backend variants satisfy. `get` never raises on a
/// missing key; `set`/`delete` request at-least the given retention.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
    async fn delete(&self, key: &str);
}

struct Slot {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process bounded LRU-ish KV store (spec §4.1 "In-process variant").
pub struct InMemoryKv {
    entries: RwLock<HashMap<String, Slot>>,
    capacity: usize,
    counters: Arc<Counters>,
}

impl InMemoryKv {
    pub fn new(capacity: usize, counters: Arc<Counters>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            counters,
        }
    }

    /// Expire all past-TTL keys, then — if still above 90% capacity —
    /// remove the 10% of entries with the shortest remaining TTL.
    fn evict(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, slot)| slot.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
            self.counters.eviction();
        }

        let high_water = (self.capacity * 9) / 10;
        if entries.len() > high_water {
            let mut by_remaining: Vec<(String, Instant)> = entries
                .iter()
                .map(|(k, slot)| (k.clone(), slot.expires_at))
                .collect();
            by_remaining.sort_by_key(|(_, expires_at)| *expires_at);

            let to_remove = (entries.len() / 10).max(1);
            for (key, _) in by_remaining.into_iter().take(to_remove) {
                entries.remove(&key);
                self.counters.eviction();
            }
        }
    }

    fn try_insert(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity && !entries.contains_key(key) {
            return false;
        }
        entries.insert(
            key.to_string(),
            Slot {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        true
    }
}

#[async_trait]
impl KvBackend for InMemoryKv {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let entries = self.entries.read();
        entries.get(key).and_then(|slot| {
            if slot.expires_at > now {
                Some(slot.value.clone())
            } else {
                None
            }
        })
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        if self.try_insert(key, value.clone(), ttl) {
            return;
        }
        // Capacity reached: evict, then a single retry. Further
        // failure is silent (spec §4.1).
        self.evict();
        let _ = self.try_insert(key, value, ttl);
    }

    async fn delete(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

/// Networked KV backend over Redis (spec §4.1 "Networked variant").
pub struct RedisKv {
    conn: ConnectionManager,
}

impl RedisKv {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvBackend for RedisKv {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.conn.clone();
        match redis::cmd("GET").arg(key).query_async(&mut conn).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, key, "redis GET failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut conn = self.conn.clone();
        let ttl_secs = ttl.as_secs().max(1);
        let result: Result<(), redis::RedisError> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await;
        if let Err(err) = result {
            tracing::warn!(error = %err, key, "redis SET failed, dropping write");
        }
    }

    async fn delete(&self, key: &str) {
        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> =
            redis::cmd("DEL").arg(key).query_async(&mut conn).await;
        if let Err(err) = result {
            tracing::warn!(error = %err, key, "redis DEL failed");
        }
    }
}

/// Build the configured KV backend, transparently degrading to the
/// in-process variant if the networked one fails to initialize (spec
/// §4.1 — "the caller (the factory) is responsible for transparently
/// degrading").
pub async fn build_backend(
    settings: &crate::settings::CacheSettings,
    counters: Arc<Counters>,
) -> Arc<dyn KvBackend> {
    if settings.backend == "redis" {
        if let Some(url) = &settings.redis_url {
            match RedisKv::connect(url).await {
                Ok(backend) => return Arc::new(backend),
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        "failed to initialize redis backend, falling back to in-process"
                    );
                }
            }
        } else {
            tracing::warn!("redis backend requested but no URL configured, falling back");
        }
    }
    Arc::new(InMemoryKv::new(settings.in_process_key_limit, counters))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_on_missing_key_is_none() {
        let kv = InMemoryKv::new(10, Arc::new(Counters::new()));
        assert!(kv.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let kv = InMemoryKv::new(10, Arc::new(Counters::new()));
        kv.set("k", b"v".to_vec(), Duration::from_secs(60)).await;
        assert_eq!(kv.get("k").await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let kv = InMemoryKv::new(10, Arc::new(Counters::new()));
        kv.set("k", b"v".to_vec(), Duration::from_secs(60)).await;
        kv.delete("k").await;
        assert!(kv.get("k").await.is_none());
    }

    #[tokio::test]
    async fn eviction_makes_room_when_full() {
        let counters = Arc::new(Counters::new());
        let kv = InMemoryKv::new(4, counters.clone());
        for i in 0..4 {
            kv.set(&format!("k{i}"), b"v".to_vec(), Duration::from_secs(60))
                .await;
        }
        // All entries fresh and capacity full: insertion of a 5th key
        // must run the eviction pass (expire-then-shortest-ttl) and
        // succeed via the single retry.
        kv.set("k4", b"v".to_vec(), Duration::from_millis(1)).await;
        assert!(kv.get("k4").await.is_some());
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let kv = InMemoryKv::new(10, Arc::new(Counters::new()));
        kv.set("k", b"v".to_vec(), Duration::from_millis(5)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(kv.get("k").await.is_none());
    }
}
