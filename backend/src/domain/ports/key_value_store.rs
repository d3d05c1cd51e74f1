//! Port for the shared fast store's string primitives.
//!
//! Every method maps to one atomic operation on the store. Callers build
//! compound behaviour (cache-aside, leases, counters) on top of these
//! primitives and never by reading and writing in two steps.
use std::time::Duration;

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by the shared store adapter.
    pub enum StoreError {
        /// Store is unreachable or the pool is exhausted.
        Unavailable { message: String } => "shared store unavailable: {message}",
        /// Store accepted the connection but rejected the command.
        Command { message: String } => "shared store command failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` at `key`; `ttl` of `None` keeps the record until it is
    /// overwritten or deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Write `value` at `key` with a TTL only when the key is absent.
    ///
    /// Returns `true` when this call created the record.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Delete `key` only when it currently holds `expected`, as one atomic
    /// step.
    ///
    /// Returns `true` when a record was deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Delete `key` unconditionally. Returns `true` when a record existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically increment the integer at `key`, creating it at zero first.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;
}
