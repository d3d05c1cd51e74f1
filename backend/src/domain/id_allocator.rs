//! Globally unique, time-ordered 64-bit identifiers.
//!
//! Layout, most significant bit first:
//!
//! | bits   | field                                    |
//! |--------|------------------------------------------|
//! | 63     | version, always `0`                      |
//! | 32..63 | seconds since 2022-01-01T00:00:00Z       |
//! | 0..32  | per-prefix counter for the calendar day  |
//!
//! The counter lives in the shared store at `icr:{prefix}:{yyyy:mm:dd}` and
//! is bumped with one atomic increment, so concurrent callers in any process
//! never receive the same value. A day with more than 2^32 allocations for one
//! prefix wraps the counter silently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use thiserror::Error;

use crate::domain::ports::{KeyValueStore, StoreError};

/// Custom epoch, 2022-01-01T00:00:00Z, in Unix seconds.
pub const ID_EPOCH_SECONDS: i64 = 1_640_995_200;

/// Namespace prefix for counter records.
pub const COUNTER_KEY_PREFIX: &str = "icr:";

const COUNTER_BITS: u32 = 32;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;
const TIMESTAMP_MASK: u64 = (1 << 31) - 1;

/// Errors raised while allocating an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdAllocatorError {
    /// The clock reads earlier than the custom epoch.
    #[error("clock reads {now}, before the identifier epoch")]
    ClockBeforeEpoch {
        /// Offending clock reading.
        now: DateTime<Utc>,
    },
    /// The store returned a counter value that cannot be a count.
    #[error("counter `{key}` returned {value}")]
    CounterOutOfRange {
        /// Counter record key.
        key: String,
        /// Value returned by the increment.
        value: i64,
    },
    /// The shared store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Compose an identifier from its timestamp offset and counter.
///
/// Both fields are masked to their bit widths and the version bit is zero.
///
/// ```
/// use promo_backend::domain::compose_id;
///
/// assert_eq!(compose_id(1, 5), (1 << 32) | 5);
/// assert!(compose_id(2, 0) > compose_id(1, u64::from(u32::MAX)));
/// ```
pub const fn compose_id(timestamp_offset: u64, counter: u64) -> u64 {
    ((timestamp_offset & TIMESTAMP_MASK) << COUNTER_BITS) | (counter & COUNTER_MASK)
}

/// Counter record key for `prefix` on the day containing `now`.
pub fn counter_key(prefix: &str, now: DateTime<Utc>) -> String {
    format!(
        "{COUNTER_KEY_PREFIX}{prefix}:{}",
        now.format("%Y:%m:%d")
    )
}

/// Identifier allocator backed by an atomic shared counter.
#[derive(Clone)]
pub struct IdAllocator {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl IdAllocator {
    /// Build an allocator reading time from `clock`.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Allocate the next identifier for `prefix`.
    ///
    /// Identifiers from one prefix increase as long as the clock does not move
    /// backwards.
    pub async fn next_id(&self, prefix: &str) -> Result<u64, IdAllocatorError> {
        let now = self.clock.utc();
        let offset = u64::try_from(now.timestamp() - ID_EPOCH_SECONDS)
            .map_err(|_| IdAllocatorError::ClockBeforeEpoch { now })?;

        let key = counter_key(prefix, now);
        let value = self.store.increment(&key).await?;
        let counter = u64::try_from(value)
            .map_err(|_| IdAllocatorError::CounterOutOfRange { key, value })?;

        Ok(compose_id(offset, counter))
    }
}
