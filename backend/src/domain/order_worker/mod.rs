//! Single consumer that persists admitted orders.
//!
//! The worker claims intents from the order stream, serialises work per user
//! with a [`DistributedLock`], re-checks that the user has no persisted order
//! for the voucher, persists, and only then acknowledges. Any failure leaves
//! the entry in this consumer's pending list; the worker then drains that list
//! oldest first before reading new entries again. The same drain runs on
//! startup, which is how entries abandoned by a crashed predecessor are
//! recovered. Delivery is therefore at least once, and the repository's
//! idempotent write makes the observable effect exactly once.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::lock::{DistributedLock, LockError, LockGuard};
use crate::domain::ports::{
    OrderQueue, OrderQueueError, OrderRepository, OrderRepositoryError, PersistOutcome,
};
use crate::domain::{MessageId, QueueMessage, RetryPolicy, Sleeper, TokioSleeper};

/// Prefix of the per-user lock taken while persisting.
pub const ORDER_LOCK_PREFIX: &str = "order:";

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderWorkerConfig {
    /// Longest a single read waits for a new entry.
    pub poll_block: Duration,
    /// Pause after a failure while draining the pending list.
    pub pending_retry_backoff: Duration,
    /// Lease of the per-user lock.
    pub lock_lease: Duration,
    /// Attempts at the per-user lock before the entry is left pending.
    pub lock_retry: RetryPolicy,
}

impl Default for OrderWorkerConfig {
    fn default() -> Self {
        Self {
            poll_block: Duration::from_secs(2),
            pending_retry_backoff: Duration::from_millis(20),
            lock_lease: Duration::from_secs(10),
            lock_retry: RetryPolicy::once(),
        }
    }
}

/// Port bundle required by the worker.
pub struct OrderWorkerPorts {
    /// Consumer-group view of the order stream.
    pub queue: Arc<dyn OrderQueue>,
    /// System of record for orders.
    pub repository: Arc<dyn OrderRepository>,
}

impl OrderWorkerPorts {
    /// Build a strongly-typed worker port bundle.
    pub fn new(queue: Arc<dyn OrderQueue>, repository: Arc<dyn OrderRepository>) -> Self {
        Self { queue, repository }
    }
}

/// What happened to one queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The order was written and the entry acknowledged.
    Persisted,
    /// The order already existed; the entry was acknowledged without a write.
    AlreadyPersisted,
    /// Relational stock was exhausted; the entry was acknowledged.
    StockExhausted,
    /// The entry could not be decoded and was acknowledged.
    Skipped,
}

/// Errors that abort processing of the current entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// The order stream failed.
    #[error(transparent)]
    Queue(#[from] OrderQueueError),
    /// The system of record failed.
    #[error(transparent)]
    Repository(#[from] OrderRepositoryError),
    /// The per-user lock could not be taken.
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Dedicated order persistence loop.
pub struct OrderPersistenceWorker {
    queue: Arc<dyn OrderQueue>,
    repository: Arc<dyn OrderRepository>,
    lock: DistributedLock,
    sleeper: Arc<dyn Sleeper>,
    config: OrderWorkerConfig,
}

impl OrderPersistenceWorker {
    /// Build a worker sleeping on the Tokio timer.
    pub fn new(ports: OrderWorkerPorts, lock: DistributedLock, config: OrderWorkerConfig) -> Self {
        Self::with_sleeper(ports, lock, Arc::new(TokioSleeper), config)
    }

    /// Build a worker with an injected sleeper.
    pub fn with_sleeper(
        ports: OrderWorkerPorts,
        lock: DistributedLock,
        sleeper: Arc<dyn Sleeper>,
        config: OrderWorkerConfig,
    ) -> Self {
        Self {
            queue: ports.queue,
            repository: ports.repository,
            lock,
            sleeper,
            config,
        }
    }

    /// Run until `shutdown` carries `true`.
    ///
    /// Shutdown is observed between entries only, so an entry being processed
    /// always completes. Entries claimed but not acknowledged stay pending and
    /// are recovered by the next start.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!("order worker starting");
        if !self.ensure_group(&shutdown).await {
            info!("order worker stopped before the consumer group was ready");
            return;
        }

        let recovered = self.drain_pending(&shutdown).await;
        if recovered > 0 {
            info!(recovered, "recovered pending orders from a previous run");
        }

        while !*shutdown.borrow() {
            if let Err(err) = self.poll_once().await {
                error!(error = %err, "order processing failed; draining pending entries");
                self.drain_pending(&shutdown).await;
            }
        }
        info!("order worker stopped");
    }

    /// Claim and process at most one new entry.
    ///
    /// Returns `Ok(None)` when nothing arrived within the poll block.
    pub async fn poll_once(&self) -> Result<Option<MessageOutcome>, WorkerError> {
        match self.queue.read_next(self.config.poll_block).await {
            Ok(None) => Ok(None),
            Ok(Some(message)) => self.process(&message).await.map(Some),
            Err(OrderQueueError::Malformed {
                message_id,
                message,
            }) => {
                self.skip_malformed(message_id, &message).await?;
                Ok(Some(MessageOutcome::Skipped))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Reprocess this consumer's pending entries, oldest first, until none
    /// remain or shutdown is requested.
    ///
    /// Returns the number of entries settled.
    pub async fn drain_pending(&self, shutdown: &watch::Receiver<bool>) -> usize {
        let mut settled = 0;
        while !*shutdown.borrow() {
            let result = match self.queue.read_pending().await {
                Ok(None) => return settled,
                Ok(Some(message)) => self.process(&message).await.map(|_| ()),
                Err(OrderQueueError::Malformed {
                    message_id,
                    message,
                }) => self.skip_malformed(message_id, &message).await,
                Err(err) => Err(err.into()),
            };
            match result {
                Ok(()) => settled += 1,
                Err(err) => {
                    warn!(error = %err, "pending order retry failed");
                    if matches!(err, WorkerError::Queue(OrderQueueError::Unavailable { .. })) {
                        self.recreate_group().await;
                    }
                    self.sleeper.sleep(self.config.pending_retry_backoff).await;
                }
            }
        }
        settled
    }

    /// Persist one entry under its user's lock and acknowledge it.
    pub async fn process(&self, message: &QueueMessage) -> Result<MessageOutcome, WorkerError> {
        let intent = &message.intent;
        let lock_name = format!("{ORDER_LOCK_PREFIX}{}", intent.user_id);
        let guard = self
            .lock
            .acquire(&lock_name, self.config.lock_lease, self.config.lock_retry)
            .await?;

        let outcome = self.persist_and_acknowledge(message).await;
        release_user_lock(guard).await;
        outcome
    }

    async fn persist_and_acknowledge(
        &self,
        message: &QueueMessage,
    ) -> Result<MessageOutcome, WorkerError> {
        let intent = &message.intent;
        let outcome = if self
            .repository
            .exists(intent.user_id, intent.voucher_id)
            .await?
        {
            warn!(
                message_id = %message.id,
                user_id = %intent.user_id,
                voucher_id = %intent.voucher_id,
                "order already persisted; acknowledging without a write"
            );
            MessageOutcome::AlreadyPersisted
        } else {
            match self.repository.persist(intent).await? {
                PersistOutcome::Persisted => {
                    info!(
                        order_id = %intent.order_id,
                        user_id = %intent.user_id,
                        voucher_id = %intent.voucher_id,
                        "order persisted"
                    );
                    MessageOutcome::Persisted
                }
                PersistOutcome::AlreadyPersisted => {
                    warn!(order_id = %intent.order_id, "order id already persisted");
                    MessageOutcome::AlreadyPersisted
                }
                PersistOutcome::StockExhausted => {
                    error!(
                        order_id = %intent.order_id,
                        voucher_id = %intent.voucher_id,
                        "relational stock exhausted for an admitted order"
                    );
                    MessageOutcome::StockExhausted
                }
            }
        };

        self.queue.acknowledge(&message.id).await?;
        info!(message_id = %message.id, ?outcome, "order entry acknowledged");
        Ok(outcome)
    }

    async fn skip_malformed(&self, message_id: String, reason: &str) -> Result<(), WorkerError> {
        warn!(%message_id, reason, "acknowledging malformed order entry");
        self.queue.acknowledge(&MessageId::new(message_id)).await?;
        Ok(())
    }

    // The stream or group may have been dropped while running (`NOGROUP`).
    // Creating it again is idempotent; a fresh group has no pending entries.
    async fn recreate_group(&self) {
        match self.queue.ensure_group().await {
            Ok(()) => debug!("order consumer group ensured after queue failure"),
            Err(err) => warn!(error = %err, "order consumer group still unavailable"),
        }
    }

    async fn ensure_group(&self, shutdown: &watch::Receiver<bool>) -> bool {
        while !*shutdown.borrow() {
            match self.queue.ensure_group().await {
                Ok(()) => return true,
                Err(err) => {
                    warn!(error = %err, "order stream not ready; retrying");
                    self.sleeper.sleep(self.config.poll_block).await;
                }
            }
        }
        false
    }
}

async fn release_user_lock(guard: LockGuard) {
    let name = guard.name().to_owned();
    match guard.release().await {
        Ok(_) => debug!(lock = %name, "user lock released"),
        Err(err) => warn!(lock = %name, error = %err, "failed to release user lock"),
    }
}

#[cfg(test)]
mod tests;
