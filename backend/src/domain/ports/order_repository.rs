//! Port for persisting admitted orders in the system of record.
use async_trait::async_trait;

use crate::domain::{OrderIntent, UserId, VoucherId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by order repository adapters.
    pub enum OrderRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "order repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "order repository query failed: {message}",
    }
}

/// Outcome of an idempotent order write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The order row was inserted and relational stock decremented.
    Persisted,
    /// An order for the same id or the same (user, voucher) already exists;
    /// nothing was written.
    AlreadyPersisted,
    /// Relational stock was already zero; the write was rolled back.
    StockExhausted,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Whether `user_id` already holds a persisted order for `voucher_id`.
    async fn exists(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
    ) -> Result<bool, OrderRepositoryError>;

    /// Insert the order and decrement relational stock in one transaction.
    async fn persist(&self, intent: &OrderIntent) -> Result<PersistOutcome, OrderRepositoryError>;
}
