//! Fixed-window request counter.
//!
//! Each `(scope, identity)` pair gets one counter per window, keyed
//! `ratelimit:<scope>:<identity>:<floor(now / window)>`. The first increment
//! in a window sets the counter's expiry; later increments leave it alone so
//! the window never stretches past its nominal length.
//!
//! Increment and compare are separate round-trips, so concurrent bursts for
//! one identity may overshoot the cap by the number of requests in flight.
//! When the cache is unavailable `increment` yields 0 and every request is
//! allowed.

use std::fmt;
use std::time::Duration;

use time::OffsetDateTime;

use crate::config::RateLimitConfig;
use crate::connection::ConnectionManager;
use crate::keys;
use crate::metrics;

/// Who a counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateScope {
    /// Authenticated user id.
    User,
    /// Client network address; guards login/signup before an identity exists.
    Ip,
}

impl RateScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateScope::User => "user",
            RateScope::Ip => "ip",
        }
    }
}

impl fmt::Display for RateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a rate-limit check. Throttling is an expected result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { limit: u64, remaining: u64 },
    Throttled { limit: u64, retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    connection: ConnectionManager,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(connection: ConnectionManager, config: RateLimitConfig) -> Self {
        Self { connection, config }
    }

    /// Requests allowed per window for `scope`.
    pub fn cap(&self, scope: RateScope) -> u64 {
        match scope {
            RateScope::User => self.config.user_cap,
            RateScope::Ip => self.config.ip_cap,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs())
    }

    fn window_secs(&self) -> u64 {
        self.config.window_secs.max(1)
    }

    /// Count one request for `identity` in the current window.
    pub async fn check(&self, scope: RateScope, identity: &str) -> RateDecision {
        let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
        self.check_at(scope, identity, now).await
    }

    /// Same as [`check`](Self::check) with an explicit clock, in unix seconds.
    pub async fn check_at(&self, scope: RateScope, identity: &str, now_secs: u64) -> RateDecision {
        let window = self.window_secs();
        let key = keys::rate_window(scope, identity, now_secs / window);
        let client = self.connection.client();

        let count = client.increment(&key).await;
        if count == 1 {
            client.expire(&key, Duration::from_secs(window)).await;
        }

        let limit = self.cap(scope);
        let count = count.max(0) as u64;
        if count > limit {
            let retry_after = Duration::from_secs(window - now_secs % window);
            tracing::debug!(
                scope = scope.as_str(),
                identity = %identity,
                count,
                limit,
                "rate limit exceeded"
            );
            metrics::record_throttled(scope.as_str());
            return RateDecision::Throttled { limit, retry_after };
        }

        RateDecision::Allowed {
            limit,
            remaining: limit - count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    // 2024-01-01T00:00:00Z, aligned to a 60s window boundary.
    const T0: u64 = 1_704_067_200;

    async fn limiter() -> (RateLimiter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let connection = ConnectionManager::with_store(store.clone(), &RedisConfig::default());
        connection.connect().await;
        (RateLimiter::new(connection, RateLimitConfig::default()), store)
    }

    #[tokio::test]
    async fn test_cap_plus_one_is_throttled() {
        let (limiter, _store) = limiter().await;

        for i in 1..=100 {
            let decision = limiter.check_at(RateScope::User, "42", T0 + 5).await;
            assert!(decision.is_allowed(), "call {i} should be allowed");
        }

        let decision = limiter.check_at(RateScope::User, "42", T0 + 30).await;
        assert_eq!(
            decision,
            RateDecision::Throttled {
                limit: 100,
                retry_after: Duration::from_secs(30)
            }
        );
    }

    #[tokio::test]
    async fn test_new_window_resets() {
        let (limiter, _store) = limiter().await;
        for _ in 0..51 {
            limiter.check_at(RateScope::Ip, "10.0.0.1", T0).await;
        }
        assert!(!limiter.check_at(RateScope::Ip, "10.0.0.1", T0 + 59).await.is_allowed());

        let next = limiter.check_at(RateScope::Ip, "10.0.0.1", T0 + 60).await;
        assert_eq!(
            next,
            RateDecision::Allowed {
                limit: 50,
                remaining: 49
            }
        );
    }

    #[tokio::test]
    async fn test_identities_and_scopes_are_independent() {
        let (limiter, _store) = limiter().await;
        for _ in 0..50 {
            limiter.check_at(RateScope::Ip, "10.0.0.1", T0).await;
        }
        assert!(!limiter.check_at(RateScope::Ip, "10.0.0.1", T0).await.is_allowed());
        assert!(limiter.check_at(RateScope::Ip, "10.0.0.2", T0).await.is_allowed());
        assert!(limiter.check_at(RateScope::User, "10.0.0.1", T0).await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_set_once_per_window() {
        let (limiter, store) = limiter().await;
        let key = keys::rate_window(RateScope::User, "7", T0 / 60);

        limiter.check_at(RateScope::User, "7", T0).await;
        assert_eq!(store.ttl(&key), Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(20)).await;
        limiter.check_at(RateScope::User, "7", T0 + 20).await;
        // Second hit does not push the expiry out.
        assert_eq!(store.ttl(&key), Some(Duration::from_secs(40)));
    }

    #[tokio::test]
    async fn test_fails_open_when_disabled() {
        let limiter = RateLimiter::new(ConnectionManager::disabled(), RateLimitConfig::default());
        for _ in 0..500 {
            assert!(limiter.check(RateScope::User, "42").await.is_allowed());
        }
    }

    #[tokio::test]
    async fn test_configured_caps() {
        let config = RateLimitConfig {
            window_secs: 10,
            user_cap: 2,
            ip_cap: 1,
        };
        let limiter = RateLimiter::new(ConnectionManager::disabled(), config);
        assert_eq!(limiter.cap(RateScope::User), 2);
        assert_eq!(limiter.cap(RateScope::Ip), 1);
        assert_eq!(limiter.window(), Duration::from_secs(10));
    }
}
