//! TTL-bounded lock leases.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempo_core::{Error, InstanceId, Lock, LockId, Result};
use tracing::debug;

use crate::store::{Lease, MemoryStore};

/// A held lease on a [`LockId`].
///
/// The lease lapses after its TTL even if never released, so a crashed
/// holder cannot starve the lock.
pub struct MemoryLock {
    store: MemoryStore,
    id: LockId,
    owner: InstanceId,
    released: AtomicBool,
}

impl MemoryLock {
    /// Take the lease if it is free, released, or expired. Never waits.
    pub(crate) fn try_acquire(
        store: &MemoryStore,
        id: LockId,
        ttl: Duration,
    ) -> Result<Option<MemoryLock>> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| Error::InvalidInput(format!("lock ttl: {}", e)))?;
        let now = Utc::now();
        let owner = store.owner();

        let mut state = store.lock();
        if let Some(lease) = state.leases.get(&id) {
            if lease.expires_at > now {
                debug!(lock = %id, holder = %lease.owner, "Lock held");
                return Ok(None);
            }
        }

        state.leases.insert(
            id,
            Lease {
                owner,
                expires_at: now + ttl,
            },
        );

        Ok(Some(MemoryLock {
            store: store.clone(),
            id,
            owner,
            released: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl Lock for MemoryLock {
    fn id(&self) -> LockId {
        self.id
    }

    async fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut state = self.store.lock();
        // An expired lease may already belong to someone else.
        if state
            .leases
            .get(&self.id)
            .is_some_and(|lease| lease.owner == self.owner)
        {
            state.leases.remove(&self.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_core::JobId;

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let store = MemoryStore::new();
        let other = store.with_owner(InstanceId::new());
        let id = LockId::JobScheduling(JobId::new(1));

        let held = MemoryLock::try_acquire(&store, id, TTL).unwrap().unwrap();
        assert!(MemoryLock::try_acquire(&other, id, TTL).unwrap().is_none());
        assert!(store.is_locked(id));

        held.release().await.unwrap();
        held.release().await.unwrap();
        assert!(!store.is_locked(id));
        assert!(MemoryLock::try_acquire(&other, id, TTL).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken() {
        let store = MemoryStore::new();
        let other = store.with_owner(InstanceId::new());
        let id = LockId::JobScheduling(JobId::new(7));

        let stale = MemoryLock::try_acquire(&store, id, Duration::from_millis(1))
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fresh = MemoryLock::try_acquire(&other, id, TTL).unwrap().unwrap();
        // Releasing the stale lease must not drop the new holder's lease.
        stale.release().await.unwrap();
        assert!(store.is_locked(id));

        fresh.release().await.unwrap();
        assert!(!store.is_locked(id));
    }
}
