//! Redis adapters for the shared fast store.
//!
//! One pool backs the key-value store (cache, lock and counter records), the
//! admission gate and the order stream consumer.

mod admission;
mod errors;
mod pool;
mod queue;
mod reply;
mod store;

pub use admission::{
    BUYERS_KEY_PREFIX, RedisAdmissionGate, STOCK_KEY_PREFIX, WINDOW_KEY_PREFIX, buyers_key,
    stock_key, window_key,
};
pub use pool::{RedisPool, RedisPoolConfig, RedisPoolError};
pub use queue::{RedisOrderQueue, StreamConsumer};
pub use store::RedisKeyValueStore;
