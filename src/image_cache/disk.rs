//! Disk Tier - Persistent Warm Cache
//!
//! Wraps a [`DiskStore`] with expiry and capacity policy.
//!
//! # Design
//!
//! - Blobs are named by the URL digest
//! - An entry expires when its modification time is older than `max_age`;
//!   reading an entry refreshes its modification time
//! - When total size exceeds `max_bytes`, oldest entries are removed until the
//!   total is at most `max_bytes * trim_ratio`
//! - Capacity is enforced after writes and on sweeps, not per read. Writes
//!   check a running usage estimate and only list the store when it passes
//!   `max_bytes`; the estimate never undercounts what this tier wrote and is
//!   resynchronized by every listing
//! - Sweeps also purge temp files of writes interrupted more than
//!   [`PARTIAL_WRITE_GRACE`] ago

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::entry::CacheKey;
use super::store::{BlobMeta, DiskStore};
use crate::error::Result;

/// Age after which an unfinished temp file is treated as abandoned
pub const PARTIAL_WRITE_GRACE: Duration = Duration::from_secs(60 * 60);

/// Disk usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskSizeReport {
    pub file_count: usize,
    pub total_bytes: u64,
}

/// Outcome of a disk sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Entries removed for age
    pub expired: usize,
    /// Entries removed for size
    pub trimmed: usize,
    /// Bytes left afterwards
    pub remaining_bytes: u64,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.expired + self.trimmed
    }
}

/// Disk tier
pub struct DiskTier {
    store: Arc<dyn DiskStore>,
    max_bytes: u64,
    max_age: Duration,
    trim_ratio: f64,
    /// Upper estimate of stored bytes; `None` until the first listing
    usage: Mutex<Option<u64>>,
}

impl DiskTier {
    pub fn new(store: Arc<dyn DiskStore>, max_bytes: u64, max_age: Duration, trim_ratio: f64) -> Self {
        Self {
            store,
            max_bytes,
            max_age,
            trim_ratio,
            usage: Mutex::new(None),
        }
    }

    fn set_usage(&self, bytes: u64) {
        *self.usage.lock() = Some(bytes);
    }

    fn is_expired(&self, meta: &BlobMeta, now: SystemTime) -> bool {
        // Clock skew into the future counts as fresh
        now.duration_since(meta.modified)
            .map(|age| age > self.max_age)
            .unwrap_or(false)
    }

    /// Read a live entry and refresh its modification time. Expired entries
    /// are deleted and reported as absent.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        let Some(meta) = self.store.metadata(key.digest()).await? else {
            return Ok(None);
        };

        if self.is_expired(&meta, SystemTime::now()) {
            debug!(url = %key, "Disk entry expired");
            self.store.remove(key.digest()).await?;
            return Ok(None);
        }

        let data = self.store.read(key.digest()).await?;
        if data.is_some() {
            if let Err(err) = self.store.touch(key.digest()).await {
                warn!(url = %key, error = %err, "Failed to refresh disk entry age");
            }
        }
        Ok(data)
    }

    /// Whether a live entry exists. Never modifies the store.
    pub async fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self
            .store
            .metadata(key.digest())
            .await?
            .is_some_and(|meta| !self.is_expired(&meta, SystemTime::now())))
    }

    /// Persist an entry, then trim if the tier is over capacity.
    pub async fn put(&self, key: &CacheKey, data: Bytes) -> Result<()> {
        let size = data.len() as u64;
        self.store.write(key.digest(), data).await?;

        let estimate = {
            let mut usage = self.usage.lock();
            if let Some(bytes) = usage.as_mut() {
                *bytes = bytes.saturating_add(size);
            }
            *usage
        };
        if estimate.is_some_and(|bytes| bytes <= self.max_bytes) {
            return Ok(());
        }

        let report = self.trim_to_capacity(self.store.list().await?, 0).await?;
        self.set_usage(report.remaining_bytes);
        Ok(())
    }

    /// Delete one entry
    pub async fn remove(&self, key: &CacheKey) -> Result<bool> {
        self.store.remove(key.digest()).await
    }

    /// Remove expired entries, then trim to capacity.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = SystemTime::now();
        let mut live = Vec::new();
        let mut expired = 0;

        for meta in self.store.list().await? {
            if self.is_expired(&meta, now) {
                if self.store.remove(&meta.key).await? {
                    expired += 1;
                }
            } else {
                live.push(meta);
            }
        }

        let report = self.trim_to_capacity(live, expired).await?;
        self.set_usage(report.remaining_bytes);

        if let Some(cutoff) = now.checked_sub(PARTIAL_WRITE_GRACE) {
            self.store.purge_partial_writes(cutoff).await?;
        }

        if report.removed() > 0 {
            info!(
                expired = report.expired,
                trimmed = report.trimmed,
                remaining_bytes = report.remaining_bytes,
                "Swept disk cache"
            );
        }
        Ok(report)
    }

    async fn trim_to_capacity(&self, mut blobs: Vec<BlobMeta>, expired: usize) -> Result<SweepReport> {
        let mut total: u64 = blobs.iter().map(|b| b.size).sum();
        let mut trimmed = 0;

        if total > self.max_bytes {
            let target = (self.max_bytes as f64 * self.trim_ratio) as u64;
            blobs.sort_by_key(|b| b.modified);

            for blob in &blobs {
                if total <= target {
                    break;
                }
                if self.store.remove(&blob.key).await? {
                    trimmed += 1;
                }
                total = total.saturating_sub(blob.size);
            }
            debug!(trimmed, remaining_bytes = total, "Trimmed disk cache to capacity");
        }

        Ok(SweepReport {
            expired,
            trimmed,
            remaining_bytes: total,
        })
    }

    /// Current usage
    pub async fn size_report(&self) -> Result<DiskSizeReport> {
        let blobs = self.store.list().await?;
        let report = DiskSizeReport {
            file_count: blobs.len(),
            total_bytes: blobs.iter().map(|b| b.size).sum(),
        };
        self.set_usage(report.total_bytes);
        Ok(report)
    }

    /// Delete everything
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await?;
        self.set_usage(0);
        Ok(())
    }
}

impl std::fmt::Debug for DiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskTier")
            .field("max_bytes", &self.max_bytes)
            .field("max_age", &self.max_age)
            .field("trim_ratio", &self.trim_ratio)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::error::Error;
    use crate::image_cache::store::InMemoryDiskStore;

    /// In-memory store that counts listings and can fail `touch`
    #[derive(Default)]
    struct InstrumentedStore {
        inner: InMemoryDiskStore,
        lists: AtomicUsize,
        fail_touch: AtomicBool,
    }

    #[async_trait::async_trait]
    impl DiskStore for InstrumentedStore {
        async fn read(&self, key: &str) -> Result<Option<Bytes>> {
            self.inner.read(key).await
        }

        async fn write(&self, key: &str, data: Bytes) -> Result<()> {
            self.inner.write(key, data).await
        }

        async fn touch(&self, key: &str) -> Result<()> {
            if self.fail_touch.load(Ordering::SeqCst) {
                return Err(Error::DiskCache {
                    key: key.to_string(),
                    reason: "read-only filesystem".into(),
                });
            }
            self.inner.touch(key).await
        }

        async fn metadata(&self, key: &str) -> Result<Option<BlobMeta>> {
            self.inner.metadata(key).await
        }

        async fn remove(&self, key: &str) -> Result<bool> {
            self.inner.remove(key).await
        }

        async fn list(&self) -> Result<Vec<BlobMeta>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list().await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
    }

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn key(name: &str) -> CacheKey {
        CacheKey::parse(&format!("https://cdn.example.com/{name}.png")).unwrap()
    }

    fn tier(store: &Arc<InMemoryDiskStore>, max_bytes: u64) -> DiskTier {
        DiskTier::new(store.clone(), max_bytes, 7 * DAY, 0.5)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = Arc::new(InMemoryDiskStore::new());
        let disk = tier(&store, u64::MAX);
        disk.put(&key("a"), Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(disk.get(&key("a")).await.unwrap().unwrap(), Bytes::from_static(b"abc"));
        assert!(disk.get(&key("b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_removed_on_read() {
        let store = Arc::new(InMemoryDiskStore::new());
        let disk = tier(&store, u64::MAX);
        let k = key("old");
        disk.put(&k, Bytes::from_static(b"abc")).await.unwrap();
        store.set_modified(k.digest(), SystemTime::now() - 8 * DAY);

        assert!(!disk.contains(&k).await.unwrap());
        assert!(disk.get(&k).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_read_refreshes_age() {
        let store = Arc::new(InMemoryDiskStore::new());
        let disk = tier(&store, u64::MAX);
        let k = key("a");
        disk.put(&k, Bytes::from_static(b"abc")).await.unwrap();
        store.set_modified(k.digest(), SystemTime::now() - 6 * DAY);

        disk.get(&k).await.unwrap();
        let meta = store.metadata(k.digest()).await.unwrap().unwrap();
        assert!(SystemTime::now().duration_since(meta.modified).unwrap() < DAY);
    }

    #[tokio::test]
    async fn test_over_capacity_trims_oldest_to_ratio() {
        let store = Arc::new(InMemoryDiskStore::new());
        let disk = tier(&store, 40);
        let now = SystemTime::now();

        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            store.write(key(name).digest(), Bytes::from(vec![0u8; 10])).await.unwrap();
            store.set_modified(key(name).digest(), now - Duration::from_secs(100 - i as u64));
        }

        // 50 bytes > 40, trim down to 20
        disk.put(&key("e"), Bytes::from(vec![0u8; 10])).await.unwrap();

        let report = disk.size_report().await.unwrap();
        assert_eq!(report.total_bytes, 20);
        assert!(!disk.contains(&key("a")).await.unwrap());
        assert!(!disk.contains(&key("c")).await.unwrap());
        assert!(disk.contains(&key("d")).await.unwrap());
        assert!(disk.contains(&key("e")).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_reports_expired_and_trimmed() {
        let store = Arc::new(InMemoryDiskStore::new());
        let disk = tier(&store, 1000);
        disk.put(&key("fresh"), Bytes::from(vec![1u8; 5])).await.unwrap();
        disk.put(&key("stale"), Bytes::from(vec![1u8; 5])).await.unwrap();
        store.set_modified(key("stale").digest(), SystemTime::now() - 30 * DAY);

        let report = disk.sweep().await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.trimmed, 0);
        assert_eq!(report.remaining_bytes, 5);
    }

    #[tokio::test]
    async fn test_clear_and_size_report() {
        let store = Arc::new(InMemoryDiskStore::new());
        let disk = tier(&store, u64::MAX);
        disk.put(&key("a"), Bytes::from(vec![1u8; 3])).await.unwrap();
        disk.put(&key("b"), Bytes::from(vec![1u8; 4])).await.unwrap();
        assert_eq!(
            disk.size_report().await.unwrap(),
            DiskSizeReport {
                file_count: 2,
                total_bytes: 7
            }
        );

        disk.clear().await.unwrap();
        assert_eq!(disk.size_report().await.unwrap(), DiskSizeReport::default());
    }

    #[tokio::test]
    async fn test_touch_failure_still_serves_data() {
        let store = Arc::new(InstrumentedStore::default());
        let disk = DiskTier::new(store.clone(), u64::MAX, 7 * DAY, 0.5);
        disk.put(&key("a"), Bytes::from_static(b"abc")).await.unwrap();

        store.fail_touch.store(true, Ordering::SeqCst);
        assert_eq!(disk.get(&key("a")).await.unwrap().unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn test_writes_under_capacity_skip_listing() {
        let store = Arc::new(InstrumentedStore::default());
        let disk = DiskTier::new(store.clone(), 90, 7 * DAY, 0.5);

        for name in ["a", "b", "c", "d"] {
            disk.put(&key(name), Bytes::from(vec![0u8; 20])).await.unwrap();
        }
        // Only the first write lists, to seed the estimate
        assert_eq!(store.lists.load(Ordering::SeqCst), 1);

        // 100 bytes passes capacity: list once and trim to at most 45
        disk.put(&key("e"), Bytes::from(vec![0u8; 20])).await.unwrap();
        assert_eq!(store.lists.load(Ordering::SeqCst), 2);
        assert_eq!(disk.size_report().await.unwrap().total_bytes, 40);
    }

    #[tokio::test]
    async fn test_sweep_purges_stale_partial_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::image_cache::store::FsDiskStore::new(dir.path()));
        let disk = DiskTier::new(store.clone(), u64::MAX, 7 * DAY, 0.5);
        disk.put(&key("a"), Bytes::from_static(b"abc")).await.unwrap();

        let partial = dir.path().join("deadbeef.part");
        std::fs::write(&partial, b"half").unwrap();
        std::fs::OpenOptions::new()
            .write(true)
            .open(&partial)
            .unwrap()
            .set_modified(SystemTime::now() - 2 * PARTIAL_WRITE_GRACE)
            .unwrap();

        disk.sweep().await.unwrap();
        assert!(!partial.exists());
        assert!(disk.contains(&key("a")).await.unwrap());
    }
}
