use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be > 0")]
    MustBePositive { field: &'static str },

    #[error("redis.url must not be empty when redis.enabled=true")]
    MissingRedisUrl,
}

fn positive(value: u64, field: &'static str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::MustBePositive { field });
    }
    Ok(())
}

/// Remote cache connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Use the remote cache at all. When false the null client is used
    /// for the whole process lifetime.
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Upper bound on a connect or reconnect attempt, in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upper bound on a single cache command, in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    true
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_command_timeout_ms() -> u64 {
    2000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl RedisConfig {
    /// Configuration that never touches the network.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Whether a remote connection should be attempted.
    pub fn is_remote(&self) -> bool {
        self.enabled && !self.url.trim().is_empty()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.url.trim().is_empty() {
            return Err(ConfigError::MissingRedisUrl);
        }
        positive(self.pool_size as u64, "redis.pool_size")?;
        positive(self.connect_timeout_ms, "redis.connect_timeout_ms")?;
        positive(self.command_timeout_ms, "redis.command_timeout_ms")?;
        Ok(())
    }
}

/// Per-resource time-to-live settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    /// Trending feed TTL in seconds
    #[serde(default = "default_trending_ttl_secs")]
    pub trending_ttl_secs: u64,

    /// User profile TTL in seconds
    #[serde(default = "default_profile_ttl_secs")]
    pub profile_ttl_secs: u64,

    /// Bookmark list TTL in seconds
    #[serde(default = "default_bookmarks_ttl_secs")]
    pub bookmarks_ttl_secs: u64,

    /// How long a logged-out token stays on the revocation list
    #[serde(default = "default_revoked_token_ttl_secs")]
    pub revoked_token_ttl_secs: u64,
}

fn default_trending_ttl_secs() -> u64 {
    600 // 10 minutes
}

fn default_profile_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_bookmarks_ttl_secs() -> u64 {
    600
}

fn default_revoked_token_ttl_secs() -> u64 {
    604_800 // 7 days
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            trending_ttl_secs: default_trending_ttl_secs(),
            profile_ttl_secs: default_profile_ttl_secs(),
            bookmarks_ttl_secs: default_bookmarks_ttl_secs(),
            revoked_token_ttl_secs: default_revoked_token_ttl_secs(),
        }
    }
}

impl CacheTtlConfig {
    pub fn trending(&self) -> Duration {
        Duration::from_secs(self.trending_ttl_secs)
    }

    pub fn profile(&self) -> Duration {
        Duration::from_secs(self.profile_ttl_secs)
    }

    pub fn bookmarks(&self) -> Duration {
        Duration::from_secs(self.bookmarks_ttl_secs)
    }

    pub fn revoked_token(&self) -> Duration {
        Duration::from_secs(self.revoked_token_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive(self.trending_ttl_secs, "cache.trending_ttl_secs")?;
        positive(self.profile_ttl_secs, "cache.profile_ttl_secs")?;
        positive(self.bookmarks_ttl_secs, "cache.bookmarks_ttl_secs")?;
        positive(self.revoked_token_ttl_secs, "cache.revoked_token_ttl_secs")?;
        Ok(())
    }
}

/// Fixed-window rate limiting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests per window for an authenticated user
    #[serde(default = "default_user_cap")]
    pub user_cap: u64,

    /// Requests per window for a client address (login/signup)
    #[serde(default = "default_ip_cap")]
    pub ip_cap: u64,
}

fn default_window_secs() -> u64 {
    60
}

fn default_user_cap() -> u64 {
    100
}

fn default_ip_cap() -> u64 {
    50
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            user_cap: default_user_cap(),
            ip_cap: default_ip_cap(),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive(self.window_secs, "rate_limit.window_secs")?;
        positive(self.user_cap, "rate_limit.user_cap")?;
        positive(self.ip_cap, "rate_limit.ip_cap")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let redis = RedisConfig::default();
        assert!(redis.is_remote());
        assert_eq!(redis.command_timeout(), Duration::from_secs(2));
        assert_eq!(redis.connect_timeout(), Duration::from_secs(2));

        let ttl = CacheTtlConfig::default();
        assert_eq!(ttl.trending(), Duration::from_secs(600));
        assert_eq!(ttl.profile(), Duration::from_secs(3600));
        assert_eq!(ttl.bookmarks(), Duration::from_secs(600));

        let rate = RateLimitConfig::default();
        assert_eq!(rate.window_secs, 60);
        assert_eq!(rate.user_cap, 100);
        assert_eq!(rate.ip_cap, 50);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let redis: RedisConfig = serde_json::from_str(r#"{"url":"redis://cache:6380"}"#).unwrap();
        assert!(redis.enabled);
        assert_eq!(redis.url, "redis://cache:6380");
        assert_eq!(redis.pool_size, 10);
    }

    #[test]
    fn test_validation() {
        let mut redis = RedisConfig::default();
        redis.url = "  ".to_string();
        assert_eq!(redis.validate(), Err(ConfigError::MissingRedisUrl));
        assert!(!redis.is_remote());

        // An empty URL is fine when the remote cache is switched off.
        redis.enabled = false;
        assert!(redis.validate().is_ok());

        let rate = RateLimitConfig {
            window_secs: 0,
            ..RateLimitConfig::default()
        };
        assert_eq!(
            rate.validate(),
            Err(ConfigError::MustBePositive {
                field: "rate_limit.window_secs"
            })
        );
    }
}
