//! Memory Tier - In-process Hot Cache
//!
//! LRU bounded by entry count and total bytes. Entries pushed out of the LRU
//! are remembered weakly: while a caller still holds the `Arc`, a lookup
//! resurrects the entry instead of going to disk.
//!
//! # Design
//!
//! - `lru::LruCache` behind a `parking_lot::Mutex` (never held across `.await`)
//! - Eviction pops least-recently-used entries until both bounds hold
//! - An entry larger than the byte bound is kept only weakly

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use super::entry::{CacheKey, CachedImage};

struct MemoryInner {
    lru: LruCache<CacheKey, Arc<CachedImage>>,
    total_bytes: u64,
    evicted: HashMap<CacheKey, Weak<CachedImage>>,
}

/// Memory tier
pub struct MemoryTier {
    inner: Mutex<MemoryInner>,
    max_entries: usize,
    max_bytes: u64,
    evictions: AtomicU64,
    resurrections: AtomicU64,
}

impl MemoryTier {
    /// Create a tier with the given bounds
    pub fn new(max_entries: usize, max_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                lru: LruCache::unbounded(),
                total_bytes: 0,
                evicted: HashMap::new(),
            }),
            max_entries: max_entries.max(1),
            max_bytes,
            evictions: AtomicU64::new(0),
            resurrections: AtomicU64::new(0),
        }
    }

    /// Look up an entry, marking it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CachedImage>> {
        let mut inner = self.inner.lock();
        if let Some(image) = inner.lru.get(key) {
            return Some(Arc::clone(image));
        }

        let alive = inner.evicted.get(key).and_then(Weak::upgrade);
        match alive {
            Some(image) => {
                inner.evicted.remove(key);
                self.resurrections.fetch_add(1, Ordering::Relaxed);
                debug!(url = %key, "Resurrected image still held by a caller");
                self.insert_locked(&mut inner, key.clone(), Arc::clone(&image));
                Some(image)
            }
            None => {
                inner.evicted.remove(key);
                None
            }
        }
    }

    /// Whether a lookup would hit, without touching recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let inner = self.inner.lock();
        inner.lru.contains(key)
            || inner
                .evicted
                .get(key)
                .is_some_and(|w| w.strong_count() > 0)
    }

    /// Insert or replace an entry. Returns the number of entries evicted.
    pub fn insert(&self, key: CacheKey, image: Arc<CachedImage>) -> usize {
        let mut inner = self.inner.lock();
        self.insert_locked(&mut inner, key, image)
    }

    fn insert_locked(&self, inner: &mut MemoryInner, key: CacheKey, image: Arc<CachedImage>) -> usize {
        inner.evicted.remove(&key);

        if image.size() > self.max_bytes {
            if let Some(old) = inner.lru.pop(&key) {
                inner.total_bytes -= old.size();
            }
            inner.evicted.insert(key, Arc::downgrade(&image));
            return 0;
        }

        inner.total_bytes += image.size();
        if let Some(old) = inner.lru.put(key, image) {
            inner.total_bytes -= old.size();
        }

        let mut evicted = 0;
        while inner.lru.len() > self.max_entries || inner.total_bytes > self.max_bytes {
            let Some((old_key, old)) = inner.lru.pop_lru() else {
                break;
            };
            inner.total_bytes -= old.size();
            inner.evicted.insert(old_key, Arc::downgrade(&old));
            evicted += 1;
        }

        if evicted > 0 {
            inner.evicted.retain(|_, w| w.strong_count() > 0);
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        evicted
    }

    /// Drop every entry, weak references included. Returns entries dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.lru.len();
        inner.lru.clear();
        inner.evicted.clear();
        inner.total_bytes = 0;
        count
    }

    /// Strongly held entries
    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes charged against the byte bound
    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().total_bytes
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn resurrections(&self) -> u64 {
        self.resurrections.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTier")
            .field("len", &self.len())
            .field("max_entries", &self.max_entries)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_cache::entry::test_png;

    fn key(name: &str) -> CacheKey {
        CacheKey::parse(&format!("https://cdn.example.com/{name}.png")).unwrap()
    }

    fn image() -> Arc<CachedImage> {
        Arc::new(CachedImage::decode("https://cdn.example.com/x.png", test_png(2, 2)).unwrap())
    }

    #[test]
    fn test_insert_get() {
        let tier = MemoryTier::new(4, u64::MAX);
        tier.insert(key("a"), image());
        assert!(tier.get(&key("a")).is_some());
        assert!(tier.get(&key("b")).is_none());
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_count_bound_evicts_lru() {
        let tier = MemoryTier::new(2, u64::MAX);
        tier.insert(key("a"), image());
        tier.insert(key("b"), image());
        tier.get(&key("a"));
        assert_eq!(tier.insert(key("c"), image()), 1);

        assert!(tier.contains(&key("a")));
        assert!(!tier.contains(&key("b")));
        assert!(tier.contains(&key("c")));
        assert_eq!(tier.evictions(), 1);
    }

    #[test]
    fn test_byte_bound_evicts() {
        let size = image().size();
        let tier = MemoryTier::new(100, size * 2);
        tier.insert(key("a"), image());
        tier.insert(key("b"), image());
        tier.insert(key("c"), image());
        assert_eq!(tier.len(), 2);
        assert!(tier.total_bytes() <= size * 2);
    }

    #[test]
    fn test_replace_does_not_double_count() {
        let tier = MemoryTier::new(4, u64::MAX);
        let img = image();
        tier.insert(key("a"), Arc::clone(&img));
        tier.insert(key("a"), Arc::clone(&img));
        assert_eq!(tier.total_bytes(), img.size());
    }

    #[test]
    fn test_evicted_entry_resurrected_while_held() {
        let tier = MemoryTier::new(1, u64::MAX);
        let held = image();
        tier.insert(key("a"), Arc::clone(&held));
        tier.insert(key("b"), image());

        assert!(tier.contains(&key("a")));
        let back = tier.get(&key("a")).unwrap();
        assert!(Arc::ptr_eq(&back, &held));
        assert_eq!(tier.resurrections(), 1);
    }

    #[test]
    fn test_evicted_entry_gone_when_released() {
        let tier = MemoryTier::new(1, u64::MAX);
        tier.insert(key("a"), image());
        tier.insert(key("b"), image());
        assert!(!tier.contains(&key("a")));
        assert!(tier.get(&key("a")).is_none());
    }

    #[test]
    fn test_clear_drops_weak_references() {
        let tier = MemoryTier::new(1, u64::MAX);
        let held = image();
        tier.insert(key("a"), Arc::clone(&held));
        tier.insert(key("b"), image());

        assert_eq!(tier.clear(), 1);
        assert!(tier.get(&key("a")).is_none());
        assert!(tier.is_empty());
        assert_eq!(tier.total_bytes(), 0);
    }

    #[test]
    fn test_oversized_entry_kept_weakly() {
        let tier = MemoryTier::new(4, 1);
        let held = image();
        assert_eq!(tier.insert(key("big"), Arc::clone(&held)), 0);
        assert_eq!(tier.len(), 0);
        assert!(tier.get(&key("big")).is_some());
    }

    #[test]
    fn test_concurrent_access() {
        let tier = Arc::new(MemoryTier::new(8, u64::MAX));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let tier = Arc::clone(&tier);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let k = key(&format!("t{t}-{i}"));
                        tier.insert(k.clone(), image());
                        tier.get(&k);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tier.len(), 8);
    }
}
