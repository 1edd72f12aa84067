//! Admission control for job scheduling.
//!
//! [`JobGuard`] bounds how many jobs are scheduled at once across every
//! pipeline sharing it. [`HeldLock`] scopes a job's scheduling lock so it is
//! released on every exit path.

use std::sync::Arc;
use tempo_core::Lock;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::{SchedulerError, SchedulerResult};

/// Default number of concurrently scheduled jobs.
pub const DEFAULT_CAPACITY: usize = 32;

/// A fixed-capacity token pool. Clones share the pool.
#[derive(Debug, Clone)]
pub struct JobGuard {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Default for JobGuard {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl JobGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a token. The token returns to the pool when dropped.
    pub async fn acquire(&self) -> SchedulerResult<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::GuardClosed)
    }

    /// Stop admitting. Pending and future acquires fail.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// A scheduling lock that must be released.
///
/// Call [`HeldLock::release`] on the normal path. If the guard is dropped
/// unreleased (the task was aborted or unwound), release is spawned onto the
/// current runtime instead.
pub struct HeldLock {
    lock: Option<Box<dyn Lock>>,
}

impl HeldLock {
    pub fn new(lock: Box<dyn Lock>) -> Self {
        Self { lock: Some(lock) }
    }

    pub async fn release(mut self) {
        if let Some(lock) = self.lock.take() {
            if let Err(e) = lock.release().await {
                warn!(lock = %lock.id(), error = %e, "Failed to release lock");
            }
        }
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = lock.release().await {
                        warn!(lock = %lock.id(), error = %e, "Failed to release lock");
                    }
                });
            }
            Err(_) => {
                warn!(lock = %lock.id(), "Lock dropped outside a runtime; it will expire");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempo_core::{JobId, LockId};

    struct CountingLock {
        releases: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Lock for CountingLock {
        fn id(&self) -> LockId {
            LockId::JobScheduling(JobId::new(1))
        }

        async fn release(&self) -> tempo_core::Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_guard_bounds_concurrency() {
        let guard = JobGuard::new(2);
        let a = guard.acquire().await.unwrap();
        let _b = guard.acquire().await.unwrap();
        assert_eq!(guard.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(20), guard.acquire()).await;
        assert!(blocked.is_err());

        drop(a);
        assert_eq!(guard.available(), 1);
        assert!(guard.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_guard_refuses() {
        let guard = JobGuard::default();
        assert_eq!(guard.capacity(), DEFAULT_CAPACITY);
        guard.close();
        assert!(matches!(guard.acquire().await, Err(SchedulerError::GuardClosed)));
    }

    #[tokio::test]
    async fn test_held_lock_released_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let held = HeldLock::new(Box::new(CountingLock {
            releases: Arc::clone(&releases),
        }));

        held.release().await;
        tokio::task::yield_now().await;
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_lock_is_released() {
        let releases = Arc::new(AtomicUsize::new(0));
        let held = HeldLock::new(Box::new(CountingLock {
            releases: Arc::clone(&releases),
        }));

        drop(held);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
