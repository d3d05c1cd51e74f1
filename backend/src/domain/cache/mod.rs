//! Cache-aside coordination over the shared store.
//!
//! Three read policies share one record format:
//!
//! - [`CacheCoordinator::get_or_load`] caches misses as an empty sentinel so
//!   lookups for ids absent from the system of record stop reaching it
//!   (penetration). Concurrent misses on one key all call the loader.
//! - [`CacheCoordinator::get_with_lock`] adds a per-key rebuild lock so only
//!   one caller loads a missing key (breakdown). The others back off and
//!   re-read within a bounded retry budget.
//! - [`CacheCoordinator::get_with_logical_expiry`] serves pre-warmed keys
//!   written without a physical TTL. A logically stale value is returned at
//!   once while a bounded pool refreshes it in the background.
//!
//! Every physical TTL is stretched by a [`TtlJitter`] so keys populated
//! together do not expire together (avalanche).

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::domain::lock::{DistributedLock, LockError, LockGuard};
use crate::domain::ports::{CacheKey, KeyValueStore, StoreError};
use crate::domain::{RetryPolicy, Sleeper, TokioSleeper};

mod jitter;

pub use jitter::{NoTtlJitter, RandomTtlJitter, TtlJitter};

/// Value cached for ids the system of record does not know.
pub const EMPTY_SENTINEL: &str = "";

/// Prefix of the lock name guarding a key's rebuild.
pub const REBUILD_LOCK_PREFIX: &str = "rebuild:";

/// Errors raised by cache reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The shared store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A cached record could not be decoded.
    #[error("cache record `{key}` is corrupt: {message}")]
    Corrupt { key: String, message: String },
    /// A value could not be encoded for caching.
    #[error("cache value for `{key}` could not be encoded: {message}")]
    Encode { key: String, message: String },
    /// The loader failed against the system of record.
    #[error("loading `{key}` from the system of record failed: {message}")]
    Loader { key: String, message: String },
    /// Another caller held the rebuild lock for the whole retry budget.
    #[error("rebuild lock for `{key}` not acquired after {attempts} attempts")]
    LockTimeout { key: String, attempts: u32 },
    /// The rebuild lock could not be taken.
    #[error(transparent)]
    Lock(LockError),
}

impl From<LockError> for CacheError {
    fn from(value: LockError) -> Self {
        match value {
            LockError::Store(err) => Self::Store(err),
            other => Self::Lock(other),
        }
    }
}

/// Physical TTLs for one cached entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    /// TTL for real values.
    pub ttl: Duration,
    /// TTL for the empty sentinel.
    pub null_ttl: Duration,
}

/// Tunables for the cache coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicyConfig {
    /// TTL for real values.
    pub ttl: Duration,
    /// TTL for the empty sentinel.
    pub null_ttl: Duration,
    /// Freshness window written into logical-expiry envelopes.
    pub logical_ttl: Duration,
    /// Lease of the per-key rebuild lock.
    pub lock_lease: Duration,
    /// Retry budget for callers waiting on another caller's rebuild.
    pub mutex_retry: RetryPolicy,
    /// Background rebuilds allowed to run at once.
    pub rebuild_concurrency: usize,
    /// Upper bound of the random TTL extension, in percent.
    pub ttl_jitter_percent: u8,
}

impl CachePolicyConfig {
    /// Physical TTLs carried by this configuration.
    pub fn ttls(&self) -> CacheTtl {
        CacheTtl {
            ttl: self.ttl,
            null_ttl: self.null_ttl,
        }
    }
}

impl Default for CachePolicyConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            null_ttl: Duration::from_secs(2 * 60),
            logical_ttl: Duration::from_secs(20),
            lock_lease: Duration::from_secs(10),
            mutex_retry: RetryPolicy::new(20, Duration::from_millis(50)),
            rebuild_concurrency: 10,
            ttl_jitter_percent: 10,
        }
    }
}

/// Runtime helpers used by the retrying read paths.
pub struct CacheRuntime {
    /// Async sleep implementation.
    pub sleeper: Arc<dyn Sleeper>,
    /// TTL jitter strategy.
    pub jitter: Arc<dyn TtlJitter>,
}

impl CacheRuntime {
    /// Tokio sleeping and random jitter of up to `jitter_percent`.
    pub fn with_jitter_percent(jitter_percent: u8) -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(RandomTtlJitter::new(jitter_percent)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogicalEntry<T> {
    data: T,
    expire_at: DateTime<Utc>,
}

enum Lookup<T> {
    Hit(T),
    Empty,
    Miss,
}

/// Cache-aside coordinator. Clones share the store, lock and rebuild pool.
#[derive(Clone)]
pub struct CacheCoordinator {
    store: Arc<dyn KeyValueStore>,
    lock: DistributedLock,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn TtlJitter>,
    rebuilds: Arc<Semaphore>,
    config: Arc<CachePolicyConfig>,
}

impl CacheCoordinator {
    /// Build a coordinator with Tokio sleeping and random TTL jitter.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: CachePolicyConfig,
    ) -> Self {
        let runtime = CacheRuntime::with_jitter_percent(config.ttl_jitter_percent);
        Self::with_runtime(store, clock, runtime, config)
    }

    /// Build a coordinator with injected runtime helpers.
    pub fn with_runtime(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        runtime: CacheRuntime,
        config: CachePolicyConfig,
    ) -> Self {
        let lock = DistributedLock::with_sleeper(store.clone(), runtime.sleeper.clone());
        Self {
            store,
            lock,
            clock,
            sleeper: runtime.sleeper,
            jitter: runtime.jitter,
            rebuilds: Arc::new(Semaphore::new(config.rebuild_concurrency.max(1))),
            config: Arc::new(config),
        }
    }

    /// Configuration in effect.
    pub fn config(&self) -> &CachePolicyConfig {
        &self.config
    }

    /// Read `key`, loading and caching it on a miss.
    ///
    /// A cached empty sentinel answers `None` without calling `loader`. A
    /// loader answer of `None` caches the sentinel for `ttl.null_ttl`.
    pub async fn get_or_load<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: CacheTtl,
        loader: F,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Display,
    {
        match self.lookup(key).await? {
            Lookup::Hit(value) => Ok(Some(value)),
            Lookup::Empty => Ok(None),
            Lookup::Miss => self.load_and_store(key, ttl, loader).await,
        }
    }

    /// Read `key`, letting only the holder of the key's rebuild lock load it.
    ///
    /// Callers that miss the lock sleep for the configured backoff and re-read,
    /// failing with [`CacheError::LockTimeout`] once the budget is spent.
    pub async fn get_with_lock<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: CacheTtl,
        loader: F,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Display,
    {
        let lock_name = rebuild_lock_name(key);
        let retry = self.config.mutex_retry;
        let attempts = retry.attempts.max(1);

        for attempt in 1..=attempts {
            match self.lookup(key).await? {
                Lookup::Hit(value) => return Ok(Some(value)),
                Lookup::Empty => return Ok(None),
                Lookup::Miss => {}
            }

            if let Some(guard) = self.lock.try_lock(&lock_name, self.config.lock_lease).await? {
                let outcome = match self.lookup(key).await {
                    Ok(Lookup::Hit(value)) => Ok(Some(value)),
                    Ok(Lookup::Empty) => Ok(None),
                    Ok(Lookup::Miss) => self.load_and_store(key, ttl, loader).await,
                    Err(err) => Err(err),
                };
                release_quietly(guard).await;
                return outcome;
            }

            debug!(%key, attempt, "rebuild lock busy; backing off");
            if attempt < attempts {
                self.sleeper.sleep(retry.backoff).await;
            }
        }

        Err(CacheError::LockTimeout {
            key: key.to_string(),
            attempts,
        })
    }

    /// Read a pre-warmed key without ever waiting on a rebuild.
    ///
    /// An absent key is a plain miss: nothing is loaded. A logically expired
    /// value is returned as is; if this caller wins the rebuild lock and the
    /// rebuild pool has room, a background task reloads the key and releases
    /// the lock when done.
    pub async fn get_with_logical_expiry<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        logical_ttl: Duration,
        loader: F,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let Some(entry) = self.read_logical::<T>(key).await? else {
            return Ok(None);
        };
        if entry.expire_at > self.clock.utc() {
            return Ok(Some(entry.data));
        }

        let lock_name = rebuild_lock_name(key);
        let guard = match self.lock.try_lock(&lock_name, self.config.lock_lease).await {
            Ok(Some(guard)) => guard,
            Ok(None) => return Ok(Some(entry.data)),
            Err(err) => {
                warn!(%key, error = %err, "rebuild lock unavailable; serving stale value");
                return Ok(Some(entry.data));
            }
        };

        match self.read_logical::<T>(key).await {
            Ok(Some(fresh)) if fresh.expire_at > self.clock.utc() => {
                release_quietly(guard).await;
                return Ok(Some(fresh.data));
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%key, error = %err, "re-read before rebuild failed");
                release_quietly(guard).await;
                return Ok(Some(entry.data));
            }
        }

        self.dispatch_rebuild(key.clone(), logical_ttl, loader, guard)
            .await;
        Ok(Some(entry.data))
    }

    /// Write `value` with a physical TTL.
    pub async fn set<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = encode(key, value)?;
        self.store
            .set(key.as_str(), &payload, Some(self.jitter.apply(ttl)))
            .await?;
        Ok(())
    }

    /// Write `value` in a logical-expiry envelope with no physical TTL.
    pub async fn set_with_logical_expiry<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        logical_ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = self.logical_payload(key, value, logical_ttl)?;
        self.store.set(key.as_str(), &payload, None).await?;
        Ok(())
    }

    fn logical_payload<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        logical_ttl: Duration,
    ) -> Result<String, CacheError> {
        let now = self.clock.utc();
        let expire_at = chrono::Duration::from_std(logical_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        encode(
            key,
            &LogicalEntry {
                data: value,
                expire_at,
            },
        )
    }

    /// Remove `key`. Returns `true` when a record existed.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.store.delete(key.as_str()).await?)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Lookup<T>, CacheError> {
        match self.store.get(key.as_str()).await? {
            None => Ok(Lookup::Miss),
            Some(raw) if raw == EMPTY_SENTINEL => Ok(Lookup::Empty),
            Some(raw) => decode(key, &raw).map(Lookup::Hit),
        }
    }

    async fn read_logical<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> Result<Option<LogicalEntry<T>>, CacheError> {
        match self.store.get(key.as_str()).await? {
            None => Ok(None),
            Some(raw) if raw == EMPTY_SENTINEL => Ok(None),
            Some(raw) => decode(key, &raw).map(Some),
        }
    }

    async fn load_and_store<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: CacheTtl,
        loader: F,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Display,
    {
        let loaded = loader().await.map_err(|err| CacheError::Loader {
            key: key.to_string(),
            message: err.to_string(),
        })?;

        match &loaded {
            Some(value) => self.set(key, value, ttl.ttl).await?,
            None => {
                debug!(%key, "caching empty sentinel for unknown id");
                self.store
                    .set(
                        key.as_str(),
                        EMPTY_SENTINEL,
                        Some(self.jitter.apply(ttl.null_ttl)),
                    )
                    .await?;
            }
        }
        Ok(loaded)
    }

    async fn dispatch_rebuild<T, F, Fut, E>(
        &self,
        key: CacheKey,
        logical_ttl: Duration,
        loader: F,
        guard: LockGuard,
    ) where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let permit = match self.rebuilds.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(%key, "rebuild pool saturated; serving stale value");
                release_quietly(guard).await;
                return;
            }
        };

        let coordinator = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = coordinator.rebuild(&key, logical_ttl, loader).await {
                warn!(%key, error = %err, "background cache rebuild failed");
            }
            release_quietly(guard).await;
        });
    }

    async fn rebuild<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        logical_ttl: Duration,
        loader: F,
    ) -> Result<(), CacheError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Display,
    {
        let loaded = loader().await.map_err(|err| CacheError::Loader {
            key: key.to_string(),
            message: err.to_string(),
        })?;
        match loaded {
            Some(value) => {
                // Encode before awaiting so the spawned future never borrows `T`.
                let payload = self.logical_payload(key, &value, logical_ttl)?;
                self.store.set(key.as_str(), &payload, None).await?;
                debug!(%key, "cache entry rebuilt");
            }
            None => {
                self.store
                    .set(
                        key.as_str(),
                        EMPTY_SENTINEL,
                        Some(self.jitter.apply(self.config.null_ttl)),
                    )
                    .await?;
                debug!(%key, "rebuilt entry vanished from the system of record");
            }
        }
        Ok(())
    }
}

fn rebuild_lock_name(key: &CacheKey) -> String {
    format!("{REBUILD_LOCK_PREFIX}{key}")
}

fn encode<T: Serialize>(key: &CacheKey, value: &T) -> Result<String, CacheError> {
    serde_json::to_string(value).map_err(|err| CacheError::Encode {
        key: key.to_string(),
        message: err.to_string(),
    })
}

fn decode<T: DeserializeOwned>(key: &CacheKey, raw: &str) -> Result<T, CacheError> {
    serde_json::from_str(raw).map_err(|err| CacheError::Corrupt {
        key: key.to_string(),
        message: err.to_string(),
    })
}

async fn release_quietly(guard: LockGuard) {
    let name = guard.name().to_owned();
    if let Err(err) = guard.release().await {
        warn!(lock = %name, error = %err, "failed to release rebuild lock");
    }
}

#[cfg(test)]
mod tests;
