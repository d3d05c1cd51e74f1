//! Process configuration loaded via OrthoConfig.
//!
//! Values come from CLI arguments, `PROMO_*` environment variables and the
//! configuration file. The jitter bound carries a loader default so an
//! otherwise empty configuration still loads; the other fields are optional
//! with accessor defaults, and the `*_config` methods assemble the typed
//! per-component configuration.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::{CachePolicyConfig, OrderWorkerConfig, RetryPolicy};
use crate::outbound::persistence::PoolConfig;
use crate::outbound::redis::{RedisPoolConfig, StreamConsumer};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_STREAM_KEY: &str = "stream.orders";
const DEFAULT_CONSUMER_GROUP: &str = "g1";
const DEFAULT_CONSUMER_NAME: &str = "c1";

/// Settings for the promotion backend process.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PROMO")]
pub struct PromoSettings {
    /// Shared store URL.
    pub redis_url: Option<String>,
    /// System-of-record URL. The worker does not start without it.
    pub database_url: Option<String>,
    /// Physical TTL of cache records, in seconds.
    pub cache_ttl_secs: Option<u64>,
    /// Physical TTL of the empty sentinel, in seconds.
    pub null_ttl_secs: Option<u64>,
    /// Upper bound of the random TTL extension, in percent.
    #[ortho_config(default = 10)]
    pub ttl_jitter_percent: u8,
    /// Lease of cache rebuild locks, in milliseconds.
    pub lock_lease_ms: Option<u64>,
    /// Logical TTL written into envelopes, in seconds.
    pub logical_expiry_secs: Option<u64>,
    /// Lock attempts on the mutex read path.
    pub mutex_retry_attempts: Option<u32>,
    /// Pause between mutex read attempts, in milliseconds.
    pub mutex_retry_backoff_ms: Option<u64>,
    /// Concurrent background rebuilds.
    pub rebuild_concurrency: Option<usize>,
    /// Order stream key.
    pub stream_key: Option<String>,
    /// Consumer group of the order stream.
    pub consumer_group: Option<String>,
    /// This process's consumer name within the group.
    pub consumer_name: Option<String>,
    /// Longest blocking read on the order stream, in milliseconds.
    pub poll_block_ms: Option<u64>,
    /// Pause after a failure while draining pending entries, in milliseconds.
    pub pending_retry_backoff_ms: Option<u64>,
    /// Attempts at the per-user order lock.
    pub order_lock_attempts: Option<u32>,
    /// Pause between per-user lock attempts, in milliseconds.
    pub order_lock_backoff_ms: Option<u64>,
}

impl PromoSettings {
    pub fn redis_url(&self) -> &str {
        self.redis_url.as_deref().unwrap_or(DEFAULT_REDIS_URL)
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.unwrap_or(1_800))
    }

    pub fn null_ttl(&self) -> Duration {
        Duration::from_secs(self.null_ttl_secs.unwrap_or(120))
    }

    pub fn ttl_jitter_percent(&self) -> u8 {
        self.ttl_jitter_percent
    }

    pub fn lock_lease(&self) -> Duration {
        Duration::from_millis(self.lock_lease_ms.unwrap_or(10_000))
    }

    pub fn logical_expiry(&self) -> Duration {
        Duration::from_secs(self.logical_expiry_secs.unwrap_or(20))
    }

    pub fn mutex_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.mutex_retry_attempts.unwrap_or(20),
            Duration::from_millis(self.mutex_retry_backoff_ms.unwrap_or(50)),
        )
    }

    pub fn rebuild_concurrency(&self) -> usize {
        self.rebuild_concurrency.unwrap_or(10)
    }

    pub fn stream_key(&self) -> &str {
        self.stream_key.as_deref().unwrap_or(DEFAULT_STREAM_KEY)
    }

    pub fn consumer_group(&self) -> &str {
        self.consumer_group
            .as_deref()
            .unwrap_or(DEFAULT_CONSUMER_GROUP)
    }

    pub fn consumer_name(&self) -> &str {
        self.consumer_name.as_deref().unwrap_or(DEFAULT_CONSUMER_NAME)
    }

    pub fn poll_block(&self) -> Duration {
        Duration::from_millis(self.poll_block_ms.unwrap_or(2_000))
    }

    pub fn pending_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.pending_retry_backoff_ms.unwrap_or(20))
    }

    pub fn order_lock_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.order_lock_attempts.unwrap_or(1),
            Duration::from_millis(self.order_lock_backoff_ms.unwrap_or(50)),
        )
    }

    /// Cache coordinator configuration.
    pub fn cache_config(&self) -> CachePolicyConfig {
        CachePolicyConfig {
            ttl: self.cache_ttl(),
            null_ttl: self.null_ttl(),
            logical_ttl: self.logical_expiry(),
            lock_lease: self.lock_lease(),
            mutex_retry: self.mutex_retry(),
            rebuild_concurrency: self.rebuild_concurrency(),
            ttl_jitter_percent: self.ttl_jitter_percent(),
        }
    }

    /// Order worker configuration.
    pub fn worker_config(&self) -> OrderWorkerConfig {
        OrderWorkerConfig {
            poll_block: self.poll_block(),
            pending_retry_backoff: self.pending_retry_backoff(),
            lock_lease: self.lock_lease(),
            lock_retry: self.order_lock_retry(),
        }
    }

    /// Names of this process's consumer of the order stream.
    pub fn stream_consumer(&self) -> StreamConsumer {
        StreamConsumer::new(
            self.stream_key(),
            self.consumer_group(),
            self.consumer_name(),
        )
    }

    pub fn redis_pool_config(&self) -> RedisPoolConfig {
        RedisPoolConfig::new(self.redis_url())
    }

    /// `None` when no database URL is configured.
    pub fn db_pool_config(&self) -> Option<PoolConfig> {
        self.database_url().map(PoolConfig::new)
    }
}
