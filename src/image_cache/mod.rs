//! Tiered Image Cache
//!
//! Answers "give me pixels for this URL" from an in-process memory tier, an
//! on-disk tier, and finally the network.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                          ImageCache                                      │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  Memory Tier          │ Disk Tier             │ Network                  │
//! │  ┌────────────────┐   │ ┌──────────────────┐  │ ┌────────────────────┐   │
//! │  │ LRU (count +   │   │ │ DiskStore blobs  │  │ │ ImageFetcher       │   │
//! │  │ bytes) + weak  │   │ │ sha256(url) name │  │ │ (coalesced per key)│   │
//! │  │ Default: 100MB │   │ │ Default: 500MB/7d│  │ │ Timeout: 30s       │   │
//! │  └────────────────┘   │ └──────────────────┘  │ └────────────────────┘   │
//! │         ▲             │         │             │           │              │
//! │         └──── promote ┴─────────┘◀── persist ─┴───────────┘              │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Behavior
//!
//! - A disk hit is promoted to memory before it is returned
//! - Concurrent requests for one URL share a single fetch
//! - Failures are never cached; a retry is another request
//! - Memory is cleared on a memory warning, disk is trimmed by age and size

mod disk;
mod entry;
mod fetcher;
mod manager;
mod memory;
mod metrics;
mod store;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use disk::{DiskSizeReport, DiskTier, SweepReport};
pub use entry::{normalize_url, CacheKey, CachedImage};
pub use fetcher::{HttpImageFetcher, ImageFetcher};
pub use manager::{ImageCache, ImageRequest, ImageSource, PreloadHandle, PreloadReport, Served};
pub use memory::MemoryTier;
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use store::{BlobMeta, DiskStore, FsDiskStore, InMemoryDiskStore};

/// Default memory tier capacity (100MB)
pub const DEFAULT_MEMORY_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Default memory tier entry count
pub const DEFAULT_MEMORY_MAX_ENTRIES: usize = 50;

/// Default disk tier capacity (500MB)
pub const DEFAULT_DISK_MAX_BYTES: u64 = 500 * 1024 * 1024;

/// Default disk entry lifetime (7 days)
pub const DEFAULT_DISK_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Default network fetch timeout
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default concurrent fetches while preloading
pub const DEFAULT_PRELOAD_CONCURRENCY: usize = 6;

/// Fraction of disk capacity kept after a size trim
pub const DEFAULT_DISK_TRIM_RATIO: f64 = 0.5;

/// Number of URLs fetched by a default cache warm
pub const DEFAULT_WARM_LIMIT: usize = 5;

/// Where an entry currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    Memory,
    Disk,
    None,
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheType::Memory => write!(f, "memory"),
            CacheType::Disk => write!(f, "disk"),
            CacheType::None => write!(f, "none"),
        }
    }
}

/// Image cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageCacheConfig {
    /// Memory tier byte bound
    pub memory_max_bytes: u64,
    /// Memory tier entry bound
    pub memory_max_entries: usize,
    /// Disk tier byte bound
    pub disk_max_bytes: u64,
    /// Disk entry lifetime since last access, in seconds
    pub disk_max_age_secs: u64,
    /// Network fetch timeout, in seconds
    pub fetch_timeout_secs: u64,
    /// Concurrent fetches while preloading
    pub preload_concurrency: usize,
    /// Fraction of `disk_max_bytes` kept after a size trim
    pub disk_trim_ratio: f64,
    /// Directory holding disk tier blobs
    pub cache_dir: PathBuf,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            memory_max_bytes: DEFAULT_MEMORY_MAX_BYTES,
            memory_max_entries: DEFAULT_MEMORY_MAX_ENTRIES,
            disk_max_bytes: DEFAULT_DISK_MAX_BYTES,
            disk_max_age_secs: DEFAULT_DISK_MAX_AGE_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            preload_concurrency: DEFAULT_PRELOAD_CONCURRENCY,
            disk_trim_ratio: DEFAULT_DISK_TRIM_RATIO,
            cache_dir: std::env::temp_dir().join("jewel-catalog").join("images"),
        }
    }
}

impl ImageCacheConfig {
    /// Load from a YAML file; missing keys take their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject bounds the tiers cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.memory_max_entries == 0 {
            return Err(Error::Config("memory_max_entries must be at least 1".into()));
        }
        if self.preload_concurrency == 0 {
            return Err(Error::Config("preload_concurrency must be at least 1".into()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(Error::Config("fetch_timeout_secs must be at least 1".into()));
        }
        if !(self.disk_trim_ratio > 0.0 && self.disk_trim_ratio <= 1.0) {
            return Err(Error::Config(format!(
                "disk_trim_ratio must be in (0, 1], got {}",
                self.disk_trim_ratio
            )));
        }
        Ok(())
    }

    pub fn disk_max_age(&self) -> Duration {
        Duration::from_secs(self.disk_max_age_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

// =============================================================================
// Tests
// =============================================================================
