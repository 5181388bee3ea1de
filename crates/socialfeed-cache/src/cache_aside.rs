//! Cache-aside read helpers.
//!
//! ## Read path
//!
//! ```text
//! get(K) ──hit──▶ deserialize ──▶ Cached { source: Cache }
//!   │
//!   └─miss / degraded──▶ fetch() ──Err──▶ propagate unchanged (never cached)
//!                           │
//!                           └─Ok──▶ set(K, json, T) (outcome ignored) ──▶ Cached { source: Source }
//! ```
//!
//! Values are stored as JSON. A cached value that no longer deserializes is
//! deleted and treated as a miss.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::CacheTtlConfig;
use crate::connection::ConnectionManager;
use crate::keys;
use crate::metrics;
use crate::model::{Post, UserId, UserProfile};
use crate::source::{FeedSource, SourceError};

/// Where a read was served from. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Cache,
    Source,
}

/// A value together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub source: CacheSource,
}

impl<T> Cached<T> {
    pub fn is_from_cache(&self) -> bool {
        self.source == CacheSource::Cache
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Read-through helpers over the shared connection.
#[derive(Debug, Clone)]
pub struct CacheAside {
    connection: ConnectionManager,
    ttl: CacheTtlConfig,
}

impl CacheAside {
    pub fn new(connection: ConnectionManager, ttl: CacheTtlConfig) -> Self {
        Self { connection, ttl }
    }

    /// Cached value under `key`, or `None` on miss.
    pub async fn try_get_cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let client = self.connection.client();
        let raw = client.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to deserialize cached value");
                client.delete(key).await;
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl` and hand it back.
    ///
    /// Storing is best-effort; the value is returned either way.
    pub async fn cache_and_return<T: Serialize>(&self, key: &str, value: T, ttl: Duration) -> T {
        match serde_json::to_string(&value) {
            Ok(payload) => {
                if self.connection.client().set(key, &payload, ttl).await {
                    tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set");
                }
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize value for cache");
            }
        }
        value
    }

    /// Generic cache-aside read.
    ///
    /// `fetch` runs at most once, and only on a miss. Its error is returned
    /// as-is and nothing is written to the cache.
    pub async fn read_through<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.try_get_cached::<T>(key).await {
            tracing::debug!(key = %key, "cache hit");
            metrics::record_cache_hit(key);
            return Ok(Cached {
                value,
                source: CacheSource::Cache,
            });
        }

        tracing::debug!(key = %key, "cache miss");
        metrics::record_cache_miss(key);

        let value = fetch().await?;
        let value = self.cache_and_return(key, value, ttl).await;
        Ok(Cached {
            value,
            source: CacheSource::Source,
        })
    }

    /// `trending:posts`
    pub async fn trending_posts(
        &self,
        source: &dyn FeedSource,
    ) -> Result<Cached<Vec<Post>>, SourceError> {
        self.read_through(keys::TRENDING_POSTS, self.ttl.trending(), || {
            source.fetch_trending_posts()
        })
        .await
    }

    /// `user:<handle>`. A missing user is reported, not cached.
    pub async fn user_by_handle(
        &self,
        source: &dyn FeedSource,
        handle: &str,
    ) -> Result<Cached<UserProfile>, SourceError> {
        self.read_through(&keys::user(handle), self.ttl.profile(), || {
            source.fetch_user_profile(handle)
        })
        .await
    }

    /// `bookmarks:<userId>`
    pub async fn bookmarks(
        &self,
        source: &dyn FeedSource,
        user_id: UserId,
    ) -> Result<Cached<Vec<Post>>, SourceError> {
        self.read_through(&keys::bookmarks(user_id), self.ttl.bookmarks(), || {
            source.fetch_bookmarks(user_id)
        })
        .await
    }
}
