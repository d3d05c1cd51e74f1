//! All-or-nothing acquisition over several independent locks.

use std::time::Duration;

use futures_util::future::join_all;
use tracing::warn;

use super::{DistributedLock, HolderToken, LockError};
use crate::domain::RetryPolicy;

/// A fixed set of locks taken together.
///
/// Members are acquired in name order so two multi-locks over overlapping
/// names cannot deadlock each other. Members may live on different stores.
#[derive(Clone)]
pub struct MultiLock {
    members: Vec<(DistributedLock, String)>,
}

impl MultiLock {
    /// Build a multi-lock from `(store handle, lock name)` pairs.
    ///
    /// Members are ordered by name and a repeated name keeps its first pair.
    pub fn new(members: impl IntoIterator<Item = (DistributedLock, String)>) -> Self {
        let mut members: Vec<_> = members.into_iter().collect();
        members.sort_by(|(_, left), (_, right)| left.cmp(right));
        members.dedup_by(|(_, later), (_, kept)| later == kept);
        Self { members }
    }

    /// Member lock names in acquisition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(_, name)| name.as_str())
    }

    /// Try once to take every member under one fresh token.
    ///
    /// If any member is held elsewhere or its store fails, every member taken
    /// so far is released before returning.
    pub async fn try_lock(&self, lease: Duration) -> Result<Option<MultiLockGuard>, LockError> {
        let holder = HolderToken::generate();
        let mut taken: Vec<(DistributedLock, String)> = Vec::with_capacity(self.members.len());

        for (lock, name) in &self.members {
            match lock.try_acquire(name, &holder, lease).await {
                Ok(true) => taken.push((lock.clone(), name.clone())),
                Ok(false) => {
                    roll_back(&taken, &holder).await;
                    return Ok(None);
                }
                Err(err) => {
                    roll_back(&taken, &holder).await;
                    return Err(err);
                }
            }
        }

        Ok(Some(MultiLockGuard {
            members: taken,
            holder,
        }))
    }

    /// Take every member, retrying the whole set with a fixed backoff.
    pub async fn acquire(
        &self,
        lease: Duration,
        policy: RetryPolicy,
    ) -> Result<MultiLockGuard, LockError> {
        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(guard) = self.try_lock(lease).await? {
                return Ok(guard);
            }
            if attempt < attempts {
                if let Some((lock, _)) = self.members.first() {
                    lock.sleeper().sleep(policy.backoff).await;
                }
            }
        }
        Err(LockError::AcquisitionTimeout {
            name: self.names().collect::<Vec<_>>().join(","),
            attempts,
        })
    }
}

async fn roll_back(taken: &[(DistributedLock, String)], holder: &HolderToken) {
    let releases = taken
        .iter()
        .map(|(lock, name)| async move { (name, lock.release(name, holder).await) });
    for (name, result) in join_all(releases).await {
        if let Err(err) = result {
            warn!(lock = %name, error = %err, "failed to roll back partially acquired lock");
        }
    }
}

/// Proof of holding every member of a [`MultiLock`].
#[must_use = "a dropped guard keeps its locks until their leases expire"]
#[derive(Debug)]
pub struct MultiLockGuard {
    members: Vec<(DistributedLock, String)>,
    holder: HolderToken,
}

impl MultiLockGuard {
    /// Token written into every member's record.
    pub fn holder(&self) -> &HolderToken {
        &self.holder
    }

    /// Release every member.
    ///
    /// All members are attempted even when one fails; the first failure is
    /// returned afterwards.
    pub async fn release(self) -> Result<(), LockError> {
        let holder = &self.holder;
        let releases = self
            .members
            .iter()
            .map(|(lock, name)| async move { (name, lock.release(name, holder).await) });

        let mut first_error = None;
        for (name, result) in join_all(releases).await {
            match result {
                Ok(true) => {}
                Ok(false) => warn!(lock = %name, "multi-lock member lease lapsed before release"),
                Err(err) => {
                    warn!(lock = %name, error = %err, "failed to release multi-lock member");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
