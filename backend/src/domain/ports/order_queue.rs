//! Port for the durable, consumer-group-readable order stream.
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{MessageId, QueueMessage};

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by the order queue adapter.
    pub enum OrderQueueError {
        /// Queue infrastructure is unavailable.
        Unavailable { message: String } => "order queue unavailable: {message}",
        /// An entry was delivered but could not be decoded. It stays pending
        /// until acknowledged.
        Malformed { message_id: String, message: String } => "order queue entry {message_id} is malformed: {message}",
    }
}

/// One consumer's view of the order stream within its consumer group.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderQueue: Send + Sync {
    /// Create the stream and consumer group when missing. Idempotent.
    async fn ensure_group(&self) -> Result<(), OrderQueueError>;

    /// Claim the next never-delivered entry, waiting at most `block`.
    ///
    /// A claimed entry enters this consumer's pending list until
    /// [`OrderQueue::acknowledge`] is called.
    async fn read_next(&self, block: Duration) -> Result<Option<QueueMessage>, OrderQueueError>;

    /// Return the oldest entry in this consumer's pending list without
    /// blocking.
    async fn read_pending(&self) -> Result<Option<QueueMessage>, OrderQueueError>;

    /// Remove an entry from the pending list.
    async fn acknowledge(&self, id: &MessageId) -> Result<(), OrderQueueError>;
}
