//! Random TTL extension so records written together do not expire together.

use std::time::Duration;

use rand::Rng;

/// Strategy for stretching a physical TTL before it is written.
pub trait TtlJitter: Send + Sync {
    /// Return `ttl` plus any jitter. Never returns less than `ttl`.
    fn apply(&self, ttl: Duration) -> Duration;
}

/// Extends each TTL by a uniformly random amount of up to `percent` of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomTtlJitter {
    percent: u8,
}

impl RandomTtlJitter {
    /// Build a jitter of up to `percent` percent, capped at 100.
    pub fn new(percent: u8) -> Self {
        Self {
            percent: percent.min(100),
        }
    }
}

impl TtlJitter for RandomTtlJitter {
    fn apply(&self, ttl: Duration) -> Duration {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let max_extra = ttl_ms / 100 * u64::from(self.percent);
        if max_extra == 0 {
            return ttl;
        }
        let extra = rand::thread_rng().gen_range(0..=max_extra);
        ttl.saturating_add(Duration::from_millis(extra))
    }
}

/// Leaves every TTL untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTtlJitter;

impl TtlJitter for NoTtlJitter {
    fn apply(&self, ttl: Duration) -> Duration {
        ttl
    }
}
