//! Per-pool lock registry.

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;

/// Held while a pool is being written to.
pub type PoolGuard<'a> = MutexGuard<'a, ()>;

/// Registry handing out one lock per pool name.
///
/// Locks are created on first use and live as long as the registry. There is
/// no eviction, so a long-lived registry grows by one entry per distinct pool
/// name it has seen.
#[derive(Debug, Default)]
pub struct PoolLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PoolLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `pool`, shared by every caller naming the same pool.
    pub fn lock(&self, pool: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(pool.to_string())
            .or_insert_with(|| {
                tracing::debug!(pool, "Created pool lock");
                Arc::new(Mutex::new(()))
            })
            .clone()
    }

    /// Number of pools with a registered lock.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_same_pool_shares_lock() {
        let locks = PoolLocks::new();
        let a = locks.lock("default");
        let b = locks.lock("default");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_distinct_pools_independent() {
        let locks = PoolLocks::new();
        let a = locks.lock("fast");
        let b = locks.lock("slow");
        assert!(!Arc::ptr_eq(&a, &b));

        let _held = a.lock();
        assert!(b.try_lock().is_some());
    }

    #[test]
    fn test_registry_never_evicts() {
        let locks = PoolLocks::new();
        assert!(locks.is_empty());
        for i in 0..10 {
            drop(locks.lock(&format!("pool-{}", i)));
        }
        assert_eq!(locks.len(), 10);
    }

    #[test]
    fn test_lock_serializes_writers() {
        let locks = Arc::new(PoolLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                std::thread::spawn(move || {
                    let lock = locks.lock("shared");
                    let _guard = lock.lock();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
