//! Bounded LRU cache of prepared statements, keyed by composed SQL text.
//!
//! Recency is tracked with a generation counter: a hit stores a fresh stamp in the entry
//! (O(1), read lock only, no allocation) and eviction scans for the smallest stamp
//! (O(n), write lock, only when the cache is over capacity).
//!
//! Handles are shared through [`CachedStatement`]. Evicting an entry only drops the
//! cache's reference, so a statement a caller is still executing stays valid; the release
//! hook runs when the last reference goes away.

use crate::error::SqlResult;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

type ReleaseFn<H> = Arc<dyn Fn(&H) + Send + Sync>;

struct Slot<H> {
    handle: H,
    release: ReleaseFn<H>,
}

impl<H> Drop for Slot<H> {
    fn drop(&mut self) {
        (self.release)(&self.handle);
    }
}

/// A shared prepared-statement handle.
pub struct CachedStatement<H> {
    slot: Arc<Slot<H>>,
}

impl<H> Clone for CachedStatement<H> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<H> Deref for CachedStatement<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.slot.handle
    }
}

impl<H: fmt::Debug> fmt::Debug for CachedStatement<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CachedStatement").field(&self.slot.handle).finish()
    }
}

/// Point-in-time cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache (0.0 when there were none).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<H> {
    stmt: CachedStatement<H>,
    last_access: AtomicU64,
}

/// Prepared statement cache.
pub struct StatementCache<H> {
    capacity: usize,
    entries: RwLock<HashMap<String, Entry<H>>>,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    release: ReleaseFn<H>,
}

impl<H: Send + Sync + 'static> fmt::Debug for StatementCache<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl<H: Send + Sync + 'static> StatementCache<H> {
    /// Create a cache holding at most `capacity` statements. `release` runs once per
    /// handle when its last reference drops.
    ///
    /// A capacity of 0 disables caching: every lookup prepares a fresh handle.
    pub fn new(capacity: usize, release: impl Fn(&H) + Send + Sync + 'static) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::with_capacity(capacity)),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            release: Arc::new(release),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    fn tick(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn wrap(&self, handle: H) -> CachedStatement<H> {
        CachedStatement {
            slot: Arc::new(Slot {
                handle,
                release: Arc::clone(&self.release),
            }),
        }
    }

    /// Look up `sql`, marking it most recently used. Counts a hit or a miss.
    pub fn get(&self, sql: &str) -> Option<CachedStatement<H>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(sql) {
            Some(entry) => {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.stmt.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a freshly prepared handle unless another caller already cached `sql`, in
    /// which case the existing handle is returned and `handle` is released.
    pub fn insert(&self, sql: &str, handle: H) -> CachedStatement<H> {
        let stmt = self.wrap(handle);
        if !self.is_enabled() {
            return stmt;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(sql) {
            existing.last_access.store(self.tick(), Ordering::Relaxed);
            return existing.stmt.clone();
        }

        entries.insert(
            sql.to_string(),
            Entry {
                stmt: stmt.clone(),
                last_access: AtomicU64::new(self.tick()),
            },
        );

        while entries.len() > self.capacity {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "tracing")]
            tracing::trace!(target: "sqlweave.cache", sql = %oldest, "evicted prepared statement");
        }
        stmt
    }

    /// Return the cached handle for `sql`, preparing and caching it on a miss.
    ///
    /// `prepare` runs outside the lock; concurrent misses on the same text may both
    /// prepare, and the loser's handle is released immediately.
    pub async fn get_or_prepare<F, Fut>(&self, sql: &str, prepare: F) -> SqlResult<CachedStatement<H>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SqlResult<H>>,
    {
        if let Some(stmt) = self.get(sql) {
            return Ok(stmt);
        }
        let handle = prepare().await?;
        Ok(self.insert(sql, handle))
    }

    /// Drop the entry for `sql`. Returns whether one existed.
    pub fn remove(&self, sql: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sql)
            .is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn cache(capacity: usize) -> (StatementCache<u32>, Arc<Mutex<Vec<u32>>>) {
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&released);
        let cache = StatementCache::new(capacity, move |h: &u32| sink.lock().unwrap().push(*h));
        (cache, released)
    }

    #[test]
    fn evicts_least_recently_used() {
        let (cache, released) = cache(3);
        for (i, sql) in ["a", "b", "c"].into_iter().enumerate() {
            drop(cache.insert(sql, i as u32));
        }
        // Touch "a" so "b" becomes the oldest.
        assert!(cache.get("a").is_some());
        drop(cache.insert("d", 3));

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
        assert_eq!(*released.lock().unwrap(), vec![1]);

        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.size, 3);
    }

    #[test]
    fn capacity_plus_one_evicts_exactly_one() {
        let (cache, released) = cache(4);
        for i in 0..5u32 {
            drop(cache.insert(&format!("q{i}"), i));
        }
        assert_eq!(cache.len(), 4);
        assert!(cache.get("q0").is_none());
        assert_eq!(*released.lock().unwrap(), vec![0]);
    }

    #[test]
    fn held_handle_outlives_eviction() {
        let (cache, released) = cache(1);
        let held = cache.insert("a", 7);
        drop(cache.insert("b", 8));

        assert!(cache.get("a").is_none());
        assert!(released.lock().unwrap().is_empty());
        assert_eq!(*held, 7);

        drop(held);
        assert_eq!(*released.lock().unwrap(), vec![7]);
    }

    #[test]
    fn concurrent_insert_keeps_first_handle() {
        let (cache, released) = cache(4);
        let first = cache.insert("a", 1);
        let second = cache.insert("a", 2);
        assert_eq!(*second, 1);
        assert_eq!(*released.lock().unwrap(), vec![2]);
        drop((first, second));
    }

    #[test]
    fn zero_capacity_never_caches() {
        let (cache, released) = cache(0);
        assert!(!cache.is_enabled());
        drop(cache.insert("a", 1));
        assert!(cache.is_empty());
        assert_eq!(*released.lock().unwrap(), vec![1]);
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let (cache, _) = cache(2);
        assert!(cache.get("a").is_none());
        drop(cache.insert("a", 1));
        assert!(cache.get("a").is_some());
        assert!(cache.get("a").is_some());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (2, 1));
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn remove_and_clear_release() {
        let (cache, released) = cache(4);
        drop(cache.insert("a", 1));
        drop(cache.insert("b", 2));
        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        cache.clear();
        assert!(cache.is_empty());
        let mut got = released.lock().unwrap().clone();
        got.sort_unstable();
        assert_eq!(got, vec![1, 2]);
    }

    #[test]
    fn concurrent_access_releases_each_handle_once() {
        const THREADS: u32 = 8;
        const OPS: u32 = 2000;

        let (cache, released) = cache(8);
        let cache = Arc::new(cache);
        let inserted = Arc::new(AtomicU64::new(0));

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let cache = Arc::clone(&cache);
                let inserted = Arc::clone(&inserted);
                std::thread::spawn(move || {
                    for i in 0..OPS {
                        let sql = format!("q{}", (t * 31 + i * 7) % 24);
                        if cache.get(&sql).is_none() {
                            inserted.fetch_add(1, Ordering::Relaxed);
                            let held = cache.insert(&sql, t * OPS + i);
                            assert!(cache.len() <= cache.capacity());
                            drop(held);
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let stats = cache.stats();
        assert!(stats.size <= stats.capacity);
        assert_eq!(stats.misses, inserted.load(Ordering::Relaxed));
        assert_eq!(stats.hits + stats.misses, u64::from(THREADS * OPS));

        let released = released.lock().unwrap().clone();
        assert_eq!(released.len() as u64, inserted.load(Ordering::Relaxed) - stats.size as u64);
        let mut unique = released.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), released.len());
    }

    #[tokio::test]
    async fn get_or_prepare_prepares_once() {
        let (cache, _) = cache(2);
        let calls = AtomicU64::new(0);
        for _ in 0..3 {
            let stmt = cache
                .get_or_prepare("select", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await
                .unwrap();
            assert_eq!(*stmt, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
