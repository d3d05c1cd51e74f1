//! Runtime abstractions shared by the retrying services.
//!
//! Services never call `tokio::time::sleep` directly; they sleep through a
//! [`Sleeper`] so tests can observe and skip backoff delays.

use std::time::Duration;

use async_trait::async_trait;

/// Async sleeping abstraction for bounded retries.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspend execution for `duration`.
    ///
    /// ```rust,no_run
    /// use async_trait::async_trait;
    /// use promo_backend::domain::Sleeper;
    /// use std::sync::atomic::{AtomicU32, Ordering};
    /// use std::time::Duration;
    ///
    /// #[derive(Default)]
    /// struct CountingSleeper {
    ///     calls: AtomicU32,
    /// }
    ///
    /// #[async_trait]
    /// impl Sleeper for CountingSleeper {
    ///     async fn sleep(&self, _duration: Duration) {
    ///         self.calls.fetch_add(1, Ordering::SeqCst);
    ///     }
    /// }
    /// # async fn demo() {
    /// let sleeper = CountingSleeper::default();
    /// sleeper.sleep(Duration::from_millis(25)).await;
    /// assert_eq!(sleeper.calls.load(Ordering::SeqCst), 1);
    /// # }
    /// ```
    async fn sleep(&self, duration: Duration);
}

/// Tokio-based sleeper implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fixed-backoff retry budget.
///
/// `attempts` counts every try including the first, so a policy with one
/// attempt never sleeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, clamped to at least one.
    pub attempts: u32,
    /// Delay between consecutive tries.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Build a policy, clamping `attempts` to at least one.
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// A single try with no backoff.
    pub const fn once() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

#[cfg(test)]
mod tests {
    use super::RetryPolicy;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    fn zero_attempts_are_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(5));
        assert_eq!(policy.attempts, 1);
    }

    #[rstest]
    fn default_policy_tries_once_without_backoff() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::once());
        assert_eq!(RetryPolicy::once().backoff, Duration::ZERO);
    }
}
