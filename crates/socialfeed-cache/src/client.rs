//! Cache clients handed out by the [`ConnectionManager`](crate::ConnectionManager).
//!
//! Both variants expose the same five operations and neither ever returns an
//! error: absence of a cache is a miss, a failed write is a no-op, a failed
//! increment reads as 0.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::connection::Link;
use crate::store::{KvStore, StoreError};

/// The capability call sites use. They never branch on the variant.
#[derive(Clone)]
pub enum CacheClient {
    /// Bounded client over the live remote store.
    Remote(RemoteClient),
    /// Always misses.
    Null(NullClient),
}

impl CacheClient {
    /// Cached value, or `None` on miss, timeout, error or degraded cache.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::Remote(client) => client.get(key).await,
            Self::Null(client) => client.get(key).await,
        }
    }

    /// Store `value` under `key` for `ttl`. Returns `false` when nothing was stored.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool {
        match self {
            Self::Remote(client) => client.set(key, value, ttl).await,
            Self::Null(client) => client.set(key, value, ttl).await,
        }
    }

    /// Delete `key`. Returns `false` when the delete was not performed.
    pub async fn delete(&self, key: &str) -> bool {
        match self {
            Self::Remote(client) => client.delete(key).await,
            Self::Null(client) => client.delete(key).await,
        }
    }

    /// Increment the counter at `key`; 0 when the cache is unavailable.
    pub async fn increment(&self, key: &str) -> i64 {
        match self {
            Self::Remote(client) => client.increment(key).await,
            Self::Null(client) => client.increment(key).await,
        }
    }

    /// Set a TTL on `key`. Returns `false` when not applied.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        match self {
            Self::Remote(client) => client.expire(key, ttl).await,
            Self::Null(client) => client.expire(key, ttl).await,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }
}

/// Wraps every store command in a hard timeout.
///
/// Before each command the shared connection state is checked; once it reads
/// `Disabled` the command resolves immediately without touching the network.
/// A timeout or store error resolves to the miss/no-op result and degrades the
/// connection for the whole process, unless a reconnect has since replaced the
/// connection this client was built on.
#[derive(Clone)]
pub struct RemoteClient {
    store: Arc<dyn KvStore>,
    link: Arc<Link>,
    /// Connection generation this client was built under.
    generation: u64,
    timeout: Duration,
}

impl RemoteClient {
    pub(crate) fn new(
        store: Arc<dyn KvStore>,
        link: Arc<Link>,
        generation: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            link,
            generation,
            timeout,
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, key: &str, command: F) -> Option<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if !self.link.is_current(self.generation) {
            return None;
        }

        match tokio::time::timeout(self.timeout, command).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::debug!(op, key = %key, error = %e, "cache command failed");
                self.link
                    .degrade(self.generation, &format!("{op} failed: {e}"));
                None
            }
            Err(_) => {
                tracing::debug!(op, key = %key, timeout = ?self.timeout, "cache command timed out");
                self.link.degrade(
                    self.generation,
                    &format!("{op} timed out after {:?}", self.timeout),
                );
                None
            }
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.bounded("GET", key, self.store.get(key)).await.flatten()
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool {
        self.bounded("SET", key, self.store.set_ex(key, value, ttl))
            .await
            .is_some()
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.bounded("DEL", key, self.store.del(key)).await.is_some()
    }

    pub async fn increment(&self, key: &str) -> i64 {
        self.bounded("INCR", key, self.store.incr(key))
            .await
            .unwrap_or(0)
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        self.bounded("EXPIRE", key, self.store.expire(key, ttl))
            .await
            .is_some()
    }
}

/// A no-op client used whenever the remote cache is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClient;

impl NullClient {
    pub async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    pub async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> bool {
        false
    }

    pub async fn delete(&self, _key: &str) -> bool {
        false
    }

    pub async fn increment(&self, _key: &str) -> i64 {
        0
    }

    pub async fn expire(&self, _key: &str, _ttl: Duration) -> bool {
        false
    }
}
