//! Test utilities for the backend crate.
//!
//! In-memory implementations of every port, with the same per-call atomicity
//! as the production adapters, plus deterministic clock and sleeper doubles.
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`, via the
//! `test-support` feature).

use std::sync::{Mutex, MutexGuard, PoisonError};

mod queue;
mod repositories;
mod runtime;
mod store;

pub use queue::InMemoryOrderQueue;
pub use repositories::{InMemoryOrderRepository, InMemoryShopRepository};
pub use runtime::{MutableClock, RecordingSleeper};
pub use store::{DEFAULT_STREAM_KEY, InMemoryStore};

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
