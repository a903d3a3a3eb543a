//! Resource lock registry: lazily created, append-only per-key locks.
//!
//! Each key resolves to exactly one lock handle for the life of the
//! coordinator. Lookup and insertion happen inside the coordinator region;
//! the returned handle is used outside it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::key::ResourceKey;
use crate::region::Region;

/// Shared handle to the mutual-exclusion lock of one resource key.
#[derive(Debug, Clone, Default)]
pub struct KeyLock {
    inner: Arc<Mutex<()>>,
}

impl KeyLock {
    fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the key. Released when the guard drops.
    pub async fn lock(&self) -> KeyGuard {
        KeyGuard {
            _guard: Arc::clone(&self.inner).lock_owned().await,
        }
    }

    pub fn try_lock(&self) -> Option<KeyGuard> {
        let guard = Arc::clone(&self.inner).try_lock_owned().ok()?;
        Some(KeyGuard { _guard: guard })
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    /// Whether both handles refer to the same underlying lock.
    pub fn same_lock(&self, other: &KeyLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Exclusive access to one resource key.
#[must_use = "the key is unlocked as soon as the guard is dropped"]
#[derive(Debug)]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Key -> lock table. No removal path.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: HashMap<ResourceKey, KeyLock>,
}

impl LockRegistry {
    pub fn get_or_create(&mut self, key: &ResourceKey) -> KeyLock {
        if let Some(lock) = self.locks.get(key) {
            return lock.clone();
        }

        tracing::debug!(key = %key, "Creating resource lock");
        let lock = KeyLock::new();
        self.locks.insert(key.clone(), lock.clone());
        lock
    }

    pub fn get(&self, key: &ResourceKey) -> Option<KeyLock> {
        self.locks.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Resolve the lock for `key`, creating it on first reference.
///
/// The region is held only for the lookup/insert.
pub(crate) fn get_or_create(region: &Region, key: &ResourceKey) -> KeyLock {
    region.lock().locks.get_or_create(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_resolves_to_same_lock() {
        let mut registry = LockRegistry::default();
        let a = registry.get_or_create(&ResourceKey::from("a"));
        let again = registry.get_or_create(&ResourceKey::from("a"));
        let b = registry.get_or_create(&ResourceKey::from("b"));

        assert!(a.same_lock(&again));
        assert!(!a.same_lock(&b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn get_does_not_create() {
        let registry = LockRegistry::default();
        assert!(registry.get(&ResourceKey::from("missing")).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let lock = KeyLock::new();
        {
            let _guard = lock.lock().await;
            assert!(lock.is_locked());
            assert!(lock.try_lock().is_none());
        }
        assert!(!lock.is_locked());
        assert!(lock.try_lock().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_access_yields_one_lock() {
        let region = Arc::new(Region::new());
        let key = ResourceKey::from("contended");

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..64 {
            let region = Arc::clone(&region);
            let key = key.clone();
            tasks.spawn(async move { get_or_create(&region, &key) });
        }

        let first = get_or_create(&region, &key);
        while let Some(lock) = tasks.join_next().await {
            assert!(lock.unwrap().same_lock(&first));
        }
        assert_eq!(region.lock().locks.len(), 1);
    }
}
