//! Per-module-key locks
//!
//! Mutating commands on the same key are serialized; different keys run in
//! parallel. Waiting is bounded: a caller that cannot get the lock within
//! the timeout gets nothing back and the engine reports `Busy`.
//!
//! Entries are created on demand and dropped again by the last guard, so the
//! table only holds keys with a holder or waiters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

type KeyLock = Arc<AsyncMutex<()>>;

/// Lock table keyed by module key
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, KeyLock>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, KeyLock>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the lock for `key`, waiting at most `timeout`
    ///
    /// Returns `None` when the wait expired.
    pub async fn acquire(&self, key: &str, timeout: Duration) -> Option<KeyGuard<'_>> {
        let lock = self
            .table()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();

        let acquired = tokio::time::timeout(timeout, lock.lock_owned()).await;
        match acquired {
            Ok(guard) => {
                debug!("Acquired module lock {}", key);
                Some(KeyGuard {
                    owner: self,
                    key: key.to_string(),
                    guard: Some(guard),
                })
            }
            Err(_) => {
                warn!("{}: failed to acquire lock within {:?}", key, timeout);
                self.release_entry(key);
                None
            }
        }
    }

    /// Drop the table entry if nobody else holds or waits on it
    fn release_entry(&self, key: &str) {
        let mut table = self.table();
        if let Some(lock) = table.get(key) {
            // Only the table's own reference is left
            if Arc::strong_count(lock) == 1 {
                table.remove(key);
            }
        }
    }

    /// Number of keys with a holder or waiters
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held lock on one module key; released on drop
#[derive(Debug)]
pub struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Unlock first so the strong count no longer includes this guard
        drop(self.guard.take());
        self.owner.release_entry(&self.key);
        debug!("Released module lock {}", self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_same_key_times_out() {
        let locks = KeyedLocks::new();
        let held = locks.acquire("biz@1.0", Duration::from_secs(1)).await.unwrap();
        assert_eq!(locks.len(), 1);

        assert!(locks
            .acquire("biz@1.0", Duration::from_millis(20))
            .await
            .is_none());

        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_independent() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire("a", Duration::from_secs(1)).await.unwrap();
        let b = locks.acquire("b", Duration::from_millis(20)).await;
        assert!(b.is_some());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.acquire("biz", Duration::from_secs(1)).await.unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                locks
                    .acquire("biz", Duration::from_secs(5))
                    .await
                    .is_some()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert!(waiter.await.unwrap());
        assert!(locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mutual_exclusion() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();

        for _ in 0..16 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire("biz", Duration::from_secs(10)).await.unwrap();
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(locks.is_empty());
    }
}
