//! In-memory consumer-group view over an [`InMemoryStore`] stream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::ports::{OrderQueue, OrderQueueError};
use crate::domain::{MessageId, OrderIntent, QueueMessage};

use super::store::{DEFAULT_STREAM_KEY, InMemoryStore, message_id};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Order queue double sharing its stream with the in-memory admission gate.
pub struct InMemoryOrderQueue {
    store: Arc<InMemoryStore>,
    stream_key: String,
    group: String,
    consumer: String,
}

impl InMemoryOrderQueue {
    /// Consumer `c1` of group `g1` on the default stream.
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self::with_names(store, DEFAULT_STREAM_KEY, "g1", "c1")
    }

    pub fn with_names(
        store: Arc<InMemoryStore>,
        stream_key: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            store,
            stream_key: stream_key.into(),
            group: group.into(),
            consumer: consumer.into(),
        }
    }

    /// Append an encoded intent, as the admission gate would.
    pub fn append(&self, intent: &OrderIntent) -> MessageId {
        self.append_fields(
            intent
                .to_fields()
                .into_iter()
                .map(|(field, value)| (field.to_owned(), value))
                .collect(),
        )
    }

    /// Append arbitrary field/value pairs.
    pub fn append_fields(&self, fields: Vec<(String, String)>) -> MessageId {
        self.store.append_entry(&self.stream_key, fields)
    }

    /// Entries delivered to this consumer and not yet acknowledged.
    pub fn pending_count(&self) -> usize {
        self.store
            .state()
            .streams
            .get(&self.stream_key)
            .and_then(|stream| stream.groups.get(&self.group))
            .map_or(0, |group| {
                group
                    .pending
                    .values()
                    .filter(|owner| **owner == self.consumer)
                    .count()
            })
    }

    fn claim_next(&self) -> Result<Option<QueueMessage>, OrderQueueError> {
        let mut state = self.store.state();
        let stream = state
            .streams
            .get_mut(&self.stream_key)
            .ok_or_else(|| no_group(&self.stream_key, &self.group))?;
        let group = stream
            .groups
            .get_mut(&self.group)
            .ok_or_else(|| no_group(&self.stream_key, &self.group))?;

        let Some((&seq, fields)) = stream.entries.range(group.last_delivered + 1..).next() else {
            return Ok(None);
        };
        group.last_delivered = seq;
        group.pending.insert(seq, self.consumer.clone());
        decode(seq, fields.clone()).map(Some)
    }

    fn oldest_pending(&self) -> Result<Option<QueueMessage>, OrderQueueError> {
        let state = self.store.state();
        let stream = state
            .streams
            .get(&self.stream_key)
            .ok_or_else(|| no_group(&self.stream_key, &self.group))?;
        let group = stream
            .groups
            .get(&self.group)
            .ok_or_else(|| no_group(&self.stream_key, &self.group))?;

        let Some(seq) = group
            .pending
            .iter()
            .find(|(_, owner)| **owner == self.consumer)
            .map(|(seq, _)| *seq)
        else {
            return Ok(None);
        };
        let fields = stream.entries.get(&seq).cloned().unwrap_or_default();
        decode(seq, fields).map(Some)
    }
}

fn no_group(stream_key: &str, group: &str) -> OrderQueueError {
    OrderQueueError::unavailable(format!(
        "NOGROUP no consumer group `{group}` for stream `{stream_key}`"
    ))
}

fn decode(seq: u64, fields: Vec<(String, String)>) -> Result<QueueMessage, OrderQueueError> {
    let id = message_id(seq);
    match OrderIntent::from_fields(fields) {
        Ok(intent) => Ok(QueueMessage { id, intent }),
        Err(err) => Err(OrderQueueError::malformed(id.as_str(), err.to_string())),
    }
}

#[async_trait]
impl OrderQueue for InMemoryOrderQueue {
    async fn ensure_group(&self) -> Result<(), OrderQueueError> {
        self.store
            .state()
            .streams
            .entry(self.stream_key.clone())
            .or_default()
            .groups
            .entry(self.group.clone())
            .or_default();
        Ok(())
    }

    async fn read_next(&self, block: Duration) -> Result<Option<QueueMessage>, OrderQueueError> {
        let deadline = Instant::now() + block;
        loop {
            if let Some(message) = self.claim_next()? {
                return Ok(Some(message));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn read_pending(&self) -> Result<Option<QueueMessage>, OrderQueueError> {
        self.oldest_pending()
    }

    async fn acknowledge(&self, id: &MessageId) -> Result<(), OrderQueueError> {
        let seq = id
            .as_str()
            .split_once('-')
            .and_then(|(seq, _)| seq.parse::<u64>().ok())
            .ok_or_else(|| OrderQueueError::unavailable(format!("invalid stream id `{id}`")))?;
        let mut state = self.store.state();
        if let Some(group) = state
            .streams
            .get_mut(&self.stream_key)
            .and_then(|stream| stream.groups.get_mut(&self.group))
        {
            group.pending.remove(&seq);
        }
        Ok(())
    }
}
