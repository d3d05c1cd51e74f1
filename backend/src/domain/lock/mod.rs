//! Cross-process mutual exclusion on the shared store.
//!
//! A lock is a record at `lock:{name}` whose value is the holder's token.
//! Acquisition is one atomic set-if-absent with a lease; release is one
//! atomic compare-and-delete, so a holder whose lease lapsed can never delete
//! the record of the holder that replaced it.
//!
//! The lease is the only protection against a crashed holder. Nothing checks
//! a fencing token against the resources the lock protects, so a holder that
//! stalls past its lease may still act on them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ports::{KeyValueStore, StoreError};
use crate::domain::{RetryPolicy, Sleeper, TokioSleeper};

mod multi;

pub use multi::{MultiLock, MultiLockGuard};

/// Namespace prefix for lock records.
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// Errors raised by lock operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// Every attempt found the lock held by someone else.
    #[error("lock `{name}` still held after {attempts} attempts")]
    AcquisitionTimeout {
        /// Lock name, without the namespace prefix.
        name: String,
        /// Attempts made, including the first.
        attempts: u32,
    },
    /// The shared store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Opaque value identifying one lock holder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HolderToken(String);

impl HolderToken {
    /// Mint a fresh, globally unique token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the token value.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for HolderToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for HolderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle for taking named locks on one shared store.
///
/// Cloning is cheap; clones share the store and sleeper.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    sleeper: Arc<dyn Sleeper>,
}

impl DistributedLock {
    /// Build a lock handle that sleeps on the Tokio timer between retries.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_sleeper(store, Arc::new(TokioSleeper))
    }

    /// Build a lock handle with an injected sleeper.
    pub fn with_sleeper(store: Arc<dyn KeyValueStore>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { store, sleeper }
    }

    /// Store key of the record backing lock `name`.
    ///
    /// ```
    /// use promo_backend::domain::DistributedLock;
    ///
    /// assert_eq!(DistributedLock::lock_key("order:7"), "lock:order:7");
    /// ```
    pub fn lock_key(name: &str) -> String {
        format!("{LOCK_KEY_PREFIX}{name}")
    }

    /// Try once to take lock `name` for `holder`. Never blocks or retries.
    pub async fn try_acquire(
        &self,
        name: &str,
        holder: &HolderToken,
        lease: Duration,
    ) -> Result<bool, LockError> {
        let acquired = self
            .store
            .set_if_absent(&Self::lock_key(name), holder.as_str(), lease)
            .await?;
        debug!(lock = name, acquired, "lock acquisition attempted");
        Ok(acquired)
    }

    /// Release lock `name` only if `holder` still owns it.
    ///
    /// Returns `false` when the record was missing or belonged to another
    /// holder; that holder's lock is left intact.
    pub async fn release(&self, name: &str, holder: &HolderToken) -> Result<bool, LockError> {
        let released = self
            .store
            .compare_and_delete(&Self::lock_key(name), holder.as_str())
            .await?;
        if !released {
            debug!(lock = name, "lock not released: lease lapsed or held by another holder");
        }
        Ok(released)
    }

    /// Try once to take lock `name` under a fresh token.
    pub async fn try_lock(
        &self,
        name: &str,
        lease: Duration,
    ) -> Result<Option<LockGuard>, LockError> {
        let holder = HolderToken::generate();
        if self.try_acquire(name, &holder, lease).await? {
            Ok(Some(LockGuard {
                lock: self.clone(),
                name: name.to_owned(),
                holder,
            }))
        } else {
            Ok(None)
        }
    }

    /// Take lock `name`, retrying with a fixed backoff up to the policy's
    /// attempt budget.
    pub async fn acquire(
        &self,
        name: &str,
        lease: Duration,
        policy: RetryPolicy,
    ) -> Result<LockGuard, LockError> {
        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(guard) = self.try_lock(name, lease).await? {
                return Ok(guard);
            }
            if attempt < attempts {
                self.sleeper.sleep(policy.backoff).await;
            }
        }
        Err(LockError::AcquisitionTimeout {
            name: name.to_owned(),
            attempts,
        })
    }

    /// Group several lock names on this store into one all-or-nothing lock.
    ///
    /// Duplicate names collapse into one member.
    pub fn multi<I, S>(&self, names: I) -> MultiLock
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MultiLock::new(names.into_iter().map(|name| (self.clone(), name.into())))
    }

    pub(crate) fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }
}

impl fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedLock").finish_non_exhaustive()
    }
}

/// Proof of holding a lock.
///
/// Dropping the guard does not release the lock; the record then lives until
/// its lease expires. Call [`LockGuard::release`].
#[must_use = "a dropped guard keeps the lock until its lease expires"]
#[derive(Debug)]
pub struct LockGuard {
    lock: DistributedLock,
    name: String,
    holder: HolderToken,
}

impl LockGuard {
    /// Lock name, without the namespace prefix.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Token written into the lock record.
    pub fn holder(&self) -> &HolderToken {
        &self.holder
    }

    /// Release the lock. Returns `false` when the lease had already lapsed.
    pub async fn release(self) -> Result<bool, LockError> {
        let released = self.lock.release(&self.name, &self.holder).await?;
        if !released {
            warn!(lock = %self.name, "lock lease lapsed before release");
        }
        Ok(released)
    }
}
