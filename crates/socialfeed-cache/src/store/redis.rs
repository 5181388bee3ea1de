//! Redis store backed by a deadpool connection pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, PoolConfig, Runtime};
use ::redis::AsyncCommands;

use super::{KvStore, StoreError, ttl_secs};
use crate::config::RedisConfig;

/// Pooled Redis connection shared by every request task.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Build the pool. No connection is opened until the first command or
    /// [`KvStore::ping`].
    pub fn from_config(config: &RedisConfig) -> Result<Self, StoreError> {
        let timeout = Duration::from_millis(config.connect_timeout_ms);

        let mut redis_config = deadpool_redis::Config::from_url(config.url.as_str());
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

fn command_error(e: ::redis::RedisError) -> StoreError {
    StoreError::Command(e.to_string())
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(command_error)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl))
            .await
            .map_err(command_error)
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await.map_err(command_error)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.incr::<_, _, i64>(key, 1).await.map_err(command_error)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.expire::<_, ()>(key, ttl_secs(ttl) as i64)
            .await
            .map_err(command_error)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        ::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
