//! Counters emitted by the cache layer.
//!
//! Recorded through the `metrics` facade; the server installs the Prometheus
//! recorder. Without a recorder these calls are no-ops.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_DEGRADED_TOTAL: &str = "cache_degraded_total";
    pub const RATE_LIMIT_THROTTLED_TOTAL: &str = "rate_limit_throttled_total";
}

/// Key namespace used as a label (`user:alice` -> `user`), keeping cardinality low.
pub fn namespace(key: &str) -> &str {
    key.split_once(':').map_or(key, |(ns, _)| ns)
}

pub fn record_cache_hit(key: &str) {
    counter!(names::CACHE_HITS_TOTAL, "namespace" => namespace(key).to_string()).increment(1);
}

pub fn record_cache_miss(key: &str) {
    counter!(names::CACHE_MISSES_TOTAL, "namespace" => namespace(key).to_string()).increment(1);
}

pub fn record_degraded() {
    counter!(names::CACHE_DEGRADED_TOTAL).increment(1);
}

pub fn record_throttled(scope: &'static str) {
    counter!(names::RATE_LIMIT_THROTTLED_TOTAL, "scope" => scope).increment(1);
}
