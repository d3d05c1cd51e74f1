//! Redis Streams implementation of the [`OrderQueue`] port.
//!
//! Each worker reads as one named consumer of one consumer group. Entries
//! claimed with `>` stay in the consumer's pending list until `XACK`, and a
//! restarted worker replays that list by reading from id `0`.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis::{self, RedisError, Value};
use tracing::warn;

use crate::domain::ports::{OrderQueue, OrderQueueError};
use crate::domain::{MessageId, OrderIntent, QueueMessage};

use super::errors::{map_pool_error, map_redis_error};
use super::pool::RedisPool;
use super::reply::{StreamEntry, first_entry};

/// Names identifying one consumer of the order stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConsumer {
    /// Stream key shared with the admission gate.
    pub stream_key: String,
    /// Consumer group.
    pub group: String,
    /// Consumer name within the group.
    pub consumer: String,
}

impl StreamConsumer {
    pub fn new(
        stream_key: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            stream_key: stream_key.into(),
            group: group.into(),
            consumer: consumer.into(),
        }
    }
}

/// Consumer-group reader over one Redis stream.
#[derive(Clone)]
pub struct RedisOrderQueue {
    pool: RedisPool,
    names: StreamConsumer,
}

impl RedisOrderQueue {
    pub fn new(pool: RedisPool, names: StreamConsumer) -> Self {
        Self { pool, names }
    }

    async fn query<T: redis::FromRedisValue>(
        &self,
        cmd: &redis::Cmd,
    ) -> Result<T, OrderQueueError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, OrderQueueError::unavailable))?;
        cmd.query_async(&mut *conn).await.map_err(map_error)
    }

    async fn read(
        &self,
        block: Option<Duration>,
        from: &str,
    ) -> Result<Option<QueueMessage>, OrderQueueError> {
        let reply: Value = self.query(&read_command(&self.names, block, from)).await?;
        let entry = first_entry(reply).map_err(OrderQueueError::unavailable)?;
        entry.map(decode).transpose()
    }
}

fn read_command(names: &StreamConsumer, block: Option<Duration>, from: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("XREADGROUP");
    cmd.arg("GROUP")
        .arg(&names.group)
        .arg(&names.consumer)
        .arg("COUNT")
        .arg(1);
    if let Some(block) = block {
        cmd.arg("BLOCK").arg(block_millis(block));
    }
    cmd.arg("STREAMS").arg(&names.stream_key).arg(from);
    cmd
}

// A missing group (`NOGROUP`) means the stream was dropped underneath the
// worker, so every failure is reported as an outage and the worker re-runs
// `ensure_group`.
fn map_error(error: RedisError) -> OrderQueueError {
    map_redis_error(
        error,
        OrderQueueError::unavailable,
        OrderQueueError::unavailable,
    )
}

// `BLOCK 0` waits forever, so the shortest wait sent is one millisecond.
fn block_millis(block: Duration) -> u64 {
    u64::try_from(block.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn decode(entry: StreamEntry) -> Result<QueueMessage, OrderQueueError> {
    let StreamEntry { id, fields } = entry;
    let Some(fields) = fields else {
        return Err(OrderQueueError::malformed(
            id,
            "entry was deleted after delivery",
        ));
    };
    match OrderIntent::from_fields(fields) {
        Ok(intent) => Ok(QueueMessage {
            id: MessageId::new(id),
            intent,
        }),
        Err(err) => {
            warn!(message_id = %id, error = %err, "undecodable order stream entry");
            Err(OrderQueueError::malformed(id, err.to_string()))
        }
    }
}

#[async_trait]
impl OrderQueue for RedisOrderQueue {
    async fn ensure_group(&self) -> Result<(), OrderQueueError> {
        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE")
            .arg(&self.names.stream_key)
            .arg(&self.names.group)
            .arg("0")
            .arg("MKSTREAM");
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, OrderQueueError::unavailable))?;
        let created: Result<Value, RedisError> = cmd.query_async(&mut *conn).await;
        match created {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
            Err(err) => Err(map_error(err)),
        }
    }

    async fn read_next(&self, block: Duration) -> Result<Option<QueueMessage>, OrderQueueError> {
        self.read(Some(block), ">").await
    }

    async fn read_pending(&self) -> Result<Option<QueueMessage>, OrderQueueError> {
        self.read(None, "0").await
    }

    async fn acknowledge(&self, id: &MessageId) -> Result<(), OrderQueueError> {
        let mut cmd = redis::cmd("XACK");
        cmd.arg(&self.names.stream_key)
            .arg(&self.names.group)
            .arg(id.as_str());
        let _: i64 = self.query(&cmd).await?;
        Ok(())
    }
}
