//! Disk Store Backends
//!
//! Generic key-value byte store under the disk tier. Keys are URL digests; each
//! blob carries its size and modification time, which the disk tier uses for
//! expiry and trimming.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{Error, Result};

/// Suffix of partially written files
const TEMP_SUFFIX: &str = ".part";

/// Blob metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub key: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// Byte store backing the disk tier
#[async_trait]
pub trait DiskStore: Send + Sync {
    /// Read a blob
    async fn read(&self, key: &str) -> Result<Option<Bytes>>;

    /// Write a blob, replacing any previous one
    async fn write(&self, key: &str, data: Bytes) -> Result<()>;

    /// Set a blob's modification time to now; missing blobs are ignored
    async fn touch(&self, key: &str) -> Result<()>;

    /// Blob metadata
    async fn metadata(&self, key: &str) -> Result<Option<BlobMeta>>;

    /// Delete a blob; `false` when it did not exist
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Metadata of every blob
    async fn list(&self) -> Result<Vec<BlobMeta>>;

    /// Delete every blob
    async fn clear(&self) -> Result<()>;

    /// Delete leftovers of interrupted writes last modified before `before`.
    /// Returns how many were removed.
    async fn purge_partial_writes(&self, _before: SystemTime) -> Result<usize> {
        Ok(0)
    }
}

// =============================================================================
// Filesystem Store
// =============================================================================

/// One file per blob in a single directory.
#[derive(Debug, Clone)]
pub struct FsDiskStore {
    root: PathBuf,
}

impl FsDiskStore {
    /// Store rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn meta_from(key: String, meta: &std::fs::Metadata) -> Result<BlobMeta> {
        Ok(BlobMeta {
            key,
            size: meta.len(),
            modified: meta.modified()?,
        })
    }
}

/// Temp file of an in-progress write, removed on drop unless committed
struct PartialWrite {
    path: PathBuf,
    committed: bool,
}

impl PartialWrite {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PartialWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn not_found_as_none<T>(result: std::io::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl DiskStore for FsDiskStore {
    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        let data = not_found_as_none(tokio::fs::read(self.path(key)).await)?;
        Ok(data.map(Bytes::from))
    }

    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;

        // Write then rename so readers never see a partial blob. An aborted
        // write can still land after the guard ran; sweeps purge those.
        let final_path = self.path(key);
        let partial = PartialWrite::new(self.root.join(format!("{key}{TEMP_SUFFIX}")));
        tokio::fs::write(&partial.path, &data).await?;
        tokio::fs::rename(&partial.path, &final_path).await?;
        partial.commit();
        Ok(())
    }

    async fn touch(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        let owned_key = key.to_string();
        let touched = tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new().write(true).open(&path)?;
            file.set_modified(SystemTime::now())
        })
        .await
        .map_err(|e| Error::DiskCache {
            key: owned_key,
            reason: e.to_string(),
        })?;
        not_found_as_none(touched)?;
        Ok(())
    }

    async fn metadata(&self, key: &str) -> Result<Option<BlobMeta>> {
        match not_found_as_none(tokio::fs::metadata(self.path(key)).await)? {
            Some(meta) if meta.is_file() => Ok(Some(Self::meta_from(key.to_string(), &meta)?)),
            _ => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(not_found_as_none(tokio::fs::remove_file(self.path(key)).await)?.is_some())
    }

    async fn list(&self) -> Result<Vec<BlobMeta>> {
        let Some(mut entries) = not_found_as_none(tokio::fs::read_dir(&self.root).await)? else {
            return Ok(Vec::new());
        };

        let mut blobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            // Entry may vanish between listing and stat
            let Some(meta) = not_found_as_none(entry.metadata().await)? else {
                continue;
            };
            if meta.is_file() {
                blobs.push(Self::meta_from(name, &meta)?);
            }
        }
        Ok(blobs)
    }

    async fn clear(&self) -> Result<()> {
        not_found_as_none(tokio::fs::remove_dir_all(&self.root).await)?;
        debug!(root = %self.root.display(), "Cleared disk store");
        Ok(())
    }

    async fn purge_partial_writes(&self, before: SystemTime) -> Result<usize> {
        let Some(mut entries) = not_found_as_none(tokio::fs::read_dir(&self.root).await)? else {
            return Ok(0);
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_name().to_string_lossy().ends_with(TEMP_SUFFIX) {
                continue;
            }
            let Some(meta) = not_found_as_none(entry.metadata().await)? else {
                continue;
            };
            if meta.modified()? < before
                && not_found_as_none(tokio::fs::remove_file(entry.path()).await)?.is_some()
            {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, root = %self.root.display(), "Purged partial writes");
        }
        Ok(removed)
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Blob store held in memory, for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct InMemoryDiskStore {
    blobs: DashMap<String, (Bytes, SystemTime)>,
}

impl InMemoryDiskStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Override a blob's modification time
    pub fn set_modified(&self, key: &str, modified: SystemTime) -> bool {
        match self.blobs.get_mut(key) {
            Some(mut blob) => {
                blob.1 = modified;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl DiskStore for InMemoryDiskStore {
    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.blobs.get(key).map(|blob| blob.0.clone()))
    }

    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        self.blobs.insert(key.to_string(), (data, SystemTime::now()));
        Ok(())
    }

    async fn touch(&self, key: &str) -> Result<()> {
        self.set_modified(key, SystemTime::now());
        Ok(())
    }

    async fn metadata(&self, key: &str) -> Result<Option<BlobMeta>> {
        Ok(self.blobs.get(key).map(|blob| BlobMeta {
            key: key.to_string(),
            size: blob.0.len() as u64,
            modified: blob.1,
        }))
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.remove(key).is_some())
    }

    async fn list(&self) -> Result<Vec<BlobMeta>> {
        Ok(self
            .blobs
            .iter()
            .map(|blob| BlobMeta {
                key: blob.key().clone(),
                size: blob.value().0.len() as u64,
                modified: blob.value().1,
            })
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.blobs.clear();
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn exercise(store: &dyn DiskStore) {
        assert!(store.read("abc").await.unwrap().is_none());
        assert!(store.metadata("abc").await.unwrap().is_none());
        store.touch("abc").await.unwrap();

        store.write("abc", Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(store.read("abc").await.unwrap().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(store.metadata("abc").await.unwrap().unwrap().size, 5);

        store.write("abc", Bytes::from_static(b"hi")).await.unwrap();
        store.write("def", Bytes::from_static(b"world")).await.unwrap();
        let mut keys: Vec<_> = store.list().await.unwrap().into_iter().map(|b| b.key).collect();
        keys.sort();
        assert_eq!(keys, vec!["abc", "def"]);

        assert!(store.remove("abc").await.unwrap());
        assert!(!store.remove("abc").await.unwrap());

        store.clear().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fs_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDiskStore::new(dir.path().join("images"));
        assert!(store.list().await.unwrap().is_empty());
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_memory_store_contract() {
        exercise(&InMemoryDiskStore::new()).await;
    }

    #[tokio::test]
    async fn test_fs_touch_refreshes_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDiskStore::new(dir.path());
        store.write("abc", Bytes::from_static(b"x")).await.unwrap();

        let old = SystemTime::now() - Duration::from_secs(3600);
        let path = dir.path().join("abc");
        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();
        assert!(store.metadata("abc").await.unwrap().unwrap().modified <= old + Duration::from_secs(1));

        store.touch("abc").await.unwrap();
        let modified = store.metadata("abc").await.unwrap().unwrap().modified;
        assert!(modified > old + Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_fs_list_skips_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(format!("abc{TEMP_SUFFIX}")), b"partial").unwrap();
        let store = FsDiskStore::new(dir.path());
        assert!(store.list().await.unwrap().is_empty());
    }

    fn set_mtime(path: &Path, modified: SystemTime) {
        std::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    #[tokio::test]
    async fn test_fs_failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the blob path makes the rename fail
        std::fs::create_dir_all(dir.path().join("abc").join("inner")).unwrap();
        let store = FsDiskStore::new(dir.path());

        assert!(store.write("abc", Bytes::from_static(b"data")).await.is_err());
        assert!(!dir.path().join(format!("abc{TEMP_SUFFIX}")).exists());
    }

    #[tokio::test]
    async fn test_fs_purges_only_stale_partial_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDiskStore::new(dir.path());
        store.write("blob", Bytes::from_static(b"x")).await.unwrap();

        let stale = dir.path().join(format!("old{TEMP_SUFFIX}"));
        let fresh = dir.path().join(format!("new{TEMP_SUFFIX}"));
        std::fs::write(&stale, b"partial").unwrap();
        std::fs::write(&fresh, b"partial").unwrap();
        let now = SystemTime::now();
        set_mtime(&stale, now - Duration::from_secs(2 * 3600));

        let cutoff = now - Duration::from_secs(3600);
        assert_eq!(store.purge_partial_writes(cutoff).await.unwrap(), 1);
        assert!(!stale.exists());
        assert!(fresh.exists());
        assert!(dir.path().join("blob").exists());
    }
}
