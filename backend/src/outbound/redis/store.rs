//! Redis implementation of the [`KeyValueStore`] port.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis::{self, RedisError, Value};

use crate::domain::ports::{KeyValueStore, StoreError};

use super::errors::{map_pool_error, map_redis_error};
use super::pool::RedisPool;

/// Deletes `KEYS[1]` only while it still holds `ARGV[1]`.
pub(crate) const COMPARE_AND_DELETE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Shared-store adapter over pooled Redis connections.
#[derive(Clone)]
pub struct RedisKeyValueStore {
    pool: RedisPool,
}

impl RedisKeyValueStore {
    /// Create a store over `pool`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use promo_backend::outbound::redis::{RedisKeyValueStore, RedisPool, RedisPoolConfig};
    ///
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let pool = RedisPool::new(RedisPoolConfig::new("redis://127.0.0.1:6379")).await?;
    /// let store = RedisKeyValueStore::new(pool);
    /// # let _ = store;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, StoreError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, StoreError::unavailable))?;
        cmd.query_async(&mut *conn).await.map_err(map_error)
    }
}

fn map_error(error: RedisError) -> StoreError {
    map_redis_error(error, StoreError::unavailable, StoreError::command)
}

pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: Value = self.query(&cmd).await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let reply: Value = self
            .query(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_millis(ttl)),
            )
            .await?;
        Ok(!matches!(reply, Value::Nil))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let deleted: i64 = self
            .query(
                redis::cmd("EVAL")
                    .arg(COMPARE_AND_DELETE_SCRIPT)
                    .arg(1)
                    .arg(key)
                    .arg(expected),
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let deleted: i64 = self.query(redis::cmd("DEL").arg(key)).await?;
        Ok(deleted > 0)
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        self.query(redis::cmd("INCR").arg(key)).await
    }
}
