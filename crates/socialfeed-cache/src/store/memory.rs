//! In-process store with Redis-like expiry semantics.
//!
//! Used for single-instance development and as the backing store in tests.
//! Expiry is evaluated lazily on access. Time comes from `tokio::time::Instant`
//! so paused-clock tests can advance past a TTL without sleeping.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{KvStore, StoreError, ttl_secs};

#[derive(Clone, Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// DashMap-backed store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of a key, `None` if missing or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Whether a live (unexpired) entry exists.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn live_value(&self, key: &str, now: Instant) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.live_value(key, Instant::now()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs(ttl));
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| MemoryEntry {
                value: "0".to_string(),
                expires_at: None,
            });

        // An expired counter restarts from zero without a TTL, as a fresh key would.
        if entry.is_expired(now) {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }

        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| StoreError::Command("value is not an integer".to_string()))?;
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = Some(now + Duration::from_secs(ttl_secs(ttl)));
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_get_and_expiry() {
        let store = MemoryStore::new();
        store
            .set_ex("user:alice", "{}", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("user:alice").await.unwrap().as_deref(), Some("{}"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.get("user:alice").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_del_missing_key_is_ok() {
        let store = MemoryStore::new();
        assert!(store.del("nope").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_and_expire() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("ratelimit:user:1:0").await.unwrap(), 1);
        assert_eq!(store.ttl("ratelimit:user:1:0"), None);

        store
            .expire("ratelimit:user:1:0", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.incr("ratelimit:user:1:0").await.unwrap(), 2);
        assert_eq!(store.ttl("ratelimit:user:1:0"), Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(store.incr("ratelimit:user:1:0").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_incr_non_integer_fails() {
        let store = MemoryStore::new();
        store
            .set_ex("trending:posts", "[]", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(matches!(
            store.incr("trending:posts").await,
            Err(StoreError::Command(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_clamped() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", Duration::ZERO).await.unwrap();
        assert!(store.contains("k"));
    }
}
