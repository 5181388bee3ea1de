//! Resilient cache-aside and rate-limiting layer for the socialfeed API.
//!
//! ## Architecture
//!
//! - **ConnectionManager**: owns the Redis connection and its state
//! - **CacheClient**: `Remote` (every command under a hard timeout) or `Null`
//!   (always misses), handed out by the manager
//! - **CacheAside**: read-through helpers for trending posts, profiles and bookmarks
//! - **Invalidator**: deletes stale keys after a write commits
//! - **RateLimiter**: fixed-window counters per user id or client address
//! - **TokenRevocations**: logged-out bearer tokens
//!
//! ```text
//! handler ─▶ RateLimiter ─┐
//!         ─▶ CacheAside ──┼─▶ ConnectionManager::client() ─▶ Remote ─▶ Redis
//!         ─▶ Invalidator ─┘                                └▶ Null
//! ```
//!
//! ## Graceful Degradation
//!
//! A cache failure is never an error. Any failed or slow command flips the
//! connection to `Disabled`; from then on reads go straight to the source of
//! truth, invalidation is a no-op and the rate limiter lets everything through,
//! until an explicit [`ConnectionManager::reconnect`].

pub mod cache_aside;
pub mod client;
pub mod config;
pub mod connection;
pub mod invalidation;
pub mod keys;
pub mod metrics;
pub mod model;
pub mod rate_limit;
pub mod revocation;
pub mod source;
pub mod store;

pub use cache_aside::{CacheAside, CacheSource, Cached};
pub use client::{CacheClient, NullClient, RemoteClient};
pub use config::{CacheTtlConfig, ConfigError, RateLimitConfig, RedisConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use invalidation::{Invalidator, Mutation};
pub use model::{FeedSort, LikeSummary, Post, PostId, UserId, UserProfile};
pub use rate_limit::{RateDecision, RateLimiter, RateScope};
pub use revocation::TokenRevocations;
pub use source::{FeedSource, SourceError};
pub use store::{KvStore, MemoryStore, RedisStore, StoreError};

/// Every component of the layer over one shared connection.
#[derive(Debug, Clone)]
pub struct CacheLayer {
    pub connection: ConnectionManager,
    pub reads: CacheAside,
    pub invalidator: Invalidator,
    pub limiter: RateLimiter,
    pub revocations: TokenRevocations,
}

impl CacheLayer {
    /// Assemble the layer around `connection` without connecting.
    pub fn new(
        connection: ConnectionManager,
        ttl: &CacheTtlConfig,
        rate_limit: &RateLimitConfig,
    ) -> Self {
        Self {
            reads: CacheAside::new(connection.clone(), ttl.clone()),
            invalidator: Invalidator::new(connection.clone()),
            limiter: RateLimiter::new(connection.clone(), rate_limit.clone()),
            revocations: TokenRevocations::new(connection.clone(), ttl.revoked_token()),
            connection,
        }
    }
}

/// Create the cache layer from configuration and attempt the initial connection.
///
/// ## Cache Modes
///
/// - **Redis disabled**: null client for the whole process
/// - **Redis enabled**: connects within `connect_timeout_ms`, null client on failure
///
/// The server starts and serves requests either way.
pub async fn create_cache_layer(
    redis: &RedisConfig,
    ttl: &CacheTtlConfig,
    rate_limit: &RateLimitConfig,
) -> CacheLayer {
    if redis.is_remote() {
        tracing::info!(url = %redis.url, "Connecting to Redis");
    }

    let connection = ConnectionManager::new(redis);
    connection.connect().await;
    CacheLayer::new(connection, ttl, rate_limit)
}
