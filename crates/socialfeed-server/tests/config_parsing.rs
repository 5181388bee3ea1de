use std::{env, fs};

use socialfeed_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("socialfeed.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
request_timeout_ms = 5000

[logging]
level = "debug"

[redis]
enabled = true
url = "redis://cache.internal:6379"
pool_size = 4
command_timeout_ms = 250

[cache]
profile_ttl_secs = 1800

[rate_limit]
window_secs = 30
user_cap = 20
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses, unspecified fields keep their defaults
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.redis.url, "redis://cache.internal:6379");
    assert_eq!(cfg.redis.pool_size, 4);
    assert_eq!(cfg.redis.connect_timeout_ms, 2000);
    assert_eq!(cfg.cache.profile_ttl_secs, 1800);
    assert_eq!(cfg.cache.trending_ttl_secs, 600);
    assert_eq!(cfg.rate_limit.user_cap, 20);
    assert_eq!(cfg.rate_limit.ip_cap, 50);

    // 2) Environment overrides win over the file
    unsafe {
        env::set_var("SOCIALFEED__RATE_LIMIT__IP_CAP", "5");
    }
    let cfg = load_config(path.to_str()).expect("should parse with env override");
    assert_eq!(cfg.rate_limit.ip_cap, 5);
    unsafe {
        env::remove_var("SOCIALFEED__RATE_LIMIT__IP_CAP");
    }

    // 3) Invalid config is rejected
    let bad = toml_content.replace("command_timeout_ms = 250", "command_timeout_ms = 9000");
    fs::write(&path, bad).expect("write bad toml");
    let err = load_config(path.to_str()).expect_err("cache timeout above request timeout");
    assert!(err.contains("command_timeout_ms"));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults are valid");
    assert_eq!(cfg.server.port, 5000);
    assert!(cfg.redis.enabled);
    assert_eq!(cfg.rate_limit.window_secs, 60);
}
