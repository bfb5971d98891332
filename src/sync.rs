//! Per-key async locks.
//!
//! Used to serialize work for one user (session transitions) and for one
//! unordered user pair (record-then-check in the match detector) while
//! leaving every other key free to proceed concurrently.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A registry of async mutexes created on demand, one per key.
///
/// Entries are removed as soon as the last holder or waiter releases them,
/// so the map only ever contains keys with work in flight.
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Waiters are served in FIFO order.
    pub async fn lock(&self, key: K) -> KeyGuard<'_, K> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&entry).lock_owned().await;
        KeyGuard {
            owner: self,
            key,
            entry,
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or waited on.
    pub fn active(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Exclusive access to one key; released on drop.
pub struct KeyGuard<'a, K: Eq + Hash> {
    owner: &'a KeyedLocks<K>,
    key: K,
    entry: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> KeyGuard<'_, K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.owner.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one in this guard: nobody else is waiting.
        if Arc::strong_count(&self.entry) == 2 {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn entries_removed_after_release() {
        let locks = KeyedLocks::new();
        {
            let guard = locks.lock(1).await;
            assert_eq!(*guard.key(), 1);
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let counter = Arc::new(AsyncMutex::new(Vec::new()));

        let held = locks.lock(7).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let _guard = locks.lock(7).await;
                counter.lock().await.push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        counter.lock().await.push("first");
        drop(held);

        waiter.await.unwrap();
        assert_eq!(*counter.lock().await, vec!["first", "second"]);
        assert_eq!(locks.active(), 0);
    }
}
