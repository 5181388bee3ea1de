use serde::{Deserialize, Serialize};
use socialfeed_cache::{CacheTtlConfig, RateLimitConfig, RedisConfig};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Per-resource cache lifetimes
    #[serde(default)]
    pub cache: CacheTtlConfig,
    /// Request counters
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        self.redis
            .validate()
            .map_err(|e| format!("redis config error: {e}"))?;
        self.cache
            .validate()
            .map_err(|e| format!("cache config error: {e}"))?;
        self.rate_limit
            .validate()
            .map_err(|e| format!("rate_limit config error: {e}"))?;
        // A slow cache must never eat the whole request budget.
        if self.redis.enabled && self.redis.command_timeout_ms >= self.server.request_timeout_ms {
            return Err(
                "redis.command_timeout_ms must be lower than server.request_timeout_ms".into(),
            );
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on a whole request, cache and source work included
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Trust the first `X-Forwarded-For` entry as the client address.
    /// Only safe behind a proxy that overwrites the header; off by default.
    #[serde(default = "default_trust_forwarded_for")]
    pub trust_forwarded_for: bool,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    5000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_trust_forwarded_for() -> bool {
    false
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            trust_forwarded_for: default_trust_forwarded_for(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "socialfeed.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., SOCIALFEED__REDIS__URL=redis://cache:6379
        builder = builder.add_source(
            Environment::with_prefix("SOCIALFEED")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.addr().port(), 5000);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        assert!(!cfg.server.trust_forwarded_for);
    }

    #[test]
    fn test_cache_timeout_must_undercut_request_timeout() {
        let mut cfg = AppConfig::default();
        cfg.server.request_timeout_ms = 1500;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("command_timeout_ms"));

        // Irrelevant once the remote cache is off.
        cfg.redis.enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut cfg = AppConfig::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_nested_validation_is_prefixed() {
        let mut cfg = AppConfig::default();
        cfg.rate_limit.ip_cap = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.starts_with("rate_limit config error"));
    }
}
