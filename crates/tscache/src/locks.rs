//! Per-key mutual exclusion for `resolve` calls.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tscache_core::{CacheKey, DataKind};

type LockId = (CacheKey, DataKind);

/// Map of `(key, kind)` to the lock held for one resolve call.
///
/// Idle locks are pruned whenever a new one is inserted, so the map holds at
/// most the locks in use plus the one being created.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    locks: RwLock<HashMap<LockId, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    async fn get_or_create_lock(&self, key: &CacheKey, kind: DataKind) -> Arc<Mutex<()>> {
        let id = (key.clone(), kind);
        let locks = self.locks.read().await;
        if let Some(lock) = locks.get(&id) {
            return lock.clone();
        }
        drop(locks);

        let mut locks = self.locks.write().await;
        // Only the map holds an idle lock; clones are handed out under the map lock.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Waits for exclusive access to `(key, kind)`.
    pub(crate) async fn acquire(&self, key: &CacheKey, kind: DataKind) -> OwnedMutexGuard<()> {
        self.get_or_create_lock(key, kind).await.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.read().await.len()
    }
}
