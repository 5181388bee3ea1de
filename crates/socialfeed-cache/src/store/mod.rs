//! Raw key-value stores sitting underneath the bounded client.
//!
//! A store speaks the five commands the cache layer needs and reports every
//! failure as a [`StoreError`]. Stores never decide what a failure means;
//! that is the job of [`crate::client::RemoteClient`], which turns errors into
//! misses and degrades the connection.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Errors raised by a raw store.
///
/// These never cross the bounded client boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Could not obtain a connection from the pool.
    #[error("Pool error: {0}")]
    Pool(String),

    /// The connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store rejected or failed a command.
    #[error("Command error: {0}")]
    Command(String),
}

/// The command set the cache layer issues against a remote store.
///
/// Values are opaque strings (JSON payloads or counters).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// `GET key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// `SET key value EX ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// `DEL key`. Deleting a missing key is not an error.
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// `INCR key`, creating the key at 0 first if missing.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// `EXPIRE key ttl`. A missing key is left alone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Round-trip used by the connection manager to validate a connection.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Redis rejects `EX 0`; clamp every TTL to at least one second.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
