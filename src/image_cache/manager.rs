//! Image Cache - Unified Tiered Lookup
//!
//! Orchestrates the memory tier, the disk tier and the network fetcher.
//!
//! ```text
//! request(url)
//!   │ normalize ── invalid ──▶ InvalidUrl (no I/O)
//!   ▼
//! memory ── hit ──▶ Served { source: Memory }
//!   │ miss
//!   ▼
//! in-flight[url] ── present ──▶ join shared fetch (coalesced)
//!   │ absent
//!   ▼
//! spawn: disk ── hit ──▶ promote to memory ──▶ Served { source: Disk }
//!          │ miss
//!          ▼
//!        fetch ─▶ decode ─▶ persist to disk ─▶ memory ──▶ Served { source: Network }
//! ```
//!
//! Each in-flight fetch counts the requests waiting on it. Dropping the last
//! waiting [`ImageRequest`] aborts the fetch and frees its slot.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use super::disk::{DiskSizeReport, DiskTier, SweepReport};
use super::entry::{CacheKey, CachedImage};
use super::fetcher::ImageFetcher;
use super::memory::MemoryTier;
use super::metrics::{CacheMetrics, LatencyTracker, MetricsSnapshot};
use super::store::DiskStore;
use super::{CacheType, ImageCacheConfig};
use crate::error::{Error, ImageError, Result};
use crate::scheduler::ScheduledTask;

/// Tier that answered a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Memory,
    Disk,
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSource::Memory => write!(f, "memory"),
            ImageSource::Disk => write!(f, "disk"),
            ImageSource::Network => write!(f, "network"),
        }
    }
}

/// Successful lookup
#[derive(Debug, Clone)]
pub struct Served {
    pub image: Arc<CachedImage>,
    pub source: ImageSource,
}

type LoadResult = std::result::Result<Served, ImageError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

struct InFlight {
    id: u64,
    future: SharedLoad,
    interest: usize,
    abort: AbortHandle,
}

/// Tiered image cache
pub struct ImageCache {
    config: ImageCacheConfig,
    memory: MemoryTier,
    disk: DiskTier,
    fetcher: Arc<dyn ImageFetcher>,
    in_flight: Mutex<HashMap<CacheKey, InFlight>>,
    next_fetch_id: AtomicU64,
    metrics: CacheMetrics,
}

impl ImageCache {
    /// Create a cache over a disk store and a fetcher
    pub fn new(
        config: ImageCacheConfig,
        store: Arc<dyn DiskStore>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Arc<Self> {
        let memory = MemoryTier::new(config.memory_max_entries, config.memory_max_bytes);
        let disk = DiskTier::new(
            store,
            config.disk_max_bytes,
            config.disk_max_age(),
            config.disk_trim_ratio,
        );

        Arc::new(Self {
            config,
            memory,
            disk,
            fetcher,
            in_flight: Mutex::new(HashMap::new()),
            next_fetch_id: AtomicU64::new(0),
            metrics: CacheMetrics::new(),
        })
    }

    pub fn config(&self) -> &ImageCacheConfig {
        &self.config
    }

    /// Start a lookup. The returned future resolves once the image is loaded;
    /// dropping it withdraws interest in the fetch.
    pub fn request(self: &Arc<Self>, url: &str) -> ImageRequest {
        let key = match CacheKey::parse(url) {
            Ok(key) => key,
            Err(err) => return ImageRequest::ready(Err(err)),
        };

        if let Some(image) = self.memory.get(&key) {
            self.metrics.record_memory_hit();
            debug!(url = %key, "Memory hit");
            return ImageRequest::ready(Ok(Served {
                image,
                source: ImageSource::Memory,
            }));
        }

        let mut in_flight = self.in_flight.lock();

        // A fetch may have landed between the first check and taking the lock
        if let Some(image) = self.memory.get(&key) {
            self.metrics.record_memory_hit();
            return ImageRequest::ready(Ok(Served {
                image,
                source: ImageSource::Memory,
            }));
        }
        self.metrics.record_memory_miss();

        let (id, future) = match in_flight.get_mut(&key) {
            Some(entry) => {
                entry.interest += 1;
                self.metrics.record_coalesced_wait();
                debug!(url = %key, waiters = entry.interest, "Joined in-flight fetch");
                (entry.id, entry.future.clone())
            }
            None => {
                let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                let handle: JoinHandle<LoadResult> =
                    tokio::spawn(Arc::clone(self).load(key.clone(), id));
                let abort = handle.abort_handle();
                let url = key.url().to_string();
                let future = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(_) => Err(ImageError::Cancelled { url }),
                    }
                }
                .boxed()
                .shared();

                in_flight.insert(
                    key.clone(),
                    InFlight {
                        id,
                        future: future.clone(),
                        interest: 1,
                        abort,
                    },
                );
                (id, future)
            }
        };
        drop(in_flight);

        ImageRequest {
            state: RequestState::Waiting {
                future,
                _interest: InterestGuard {
                    cache: Arc::clone(self),
                    key,
                    id,
                },
            },
        }
    }

    /// Load an image through the tiers
    pub async fn get(self: &Arc<Self>, url: &str) -> std::result::Result<Arc<CachedImage>, ImageError> {
        self.request(url).await.map(|served| served.image)
    }

    /// Load an image and report which tier answered
    pub async fn get_served(self: &Arc<Self>, url: &str) -> LoadResult {
        self.request(url).await
    }

    /// Body of a spawned fetch: disk, then network.
    async fn load(self: Arc<Self>, key: CacheKey, id: u64) -> LoadResult {
        let result = self.load_uncached(&key).await;
        self.release_slot(&key, id);
        result
    }

    async fn load_uncached(&self, key: &CacheKey) -> LoadResult {
        match self.disk.get(key).await {
            Ok(Some(bytes)) => match CachedImage::decode_blocking(key.url(), bytes).await {
                Ok(image) => {
                    let image = Arc::new(image);
                    self.metrics.record_disk_hit();
                    self.metrics.record_promotion();
                    self.store_in_memory(key, Arc::clone(&image));
                    debug!(url = %key, "Disk hit, promoted to memory");
                    return Ok(Served {
                        image,
                        source: ImageSource::Disk,
                    });
                }
                Err(err) => {
                    warn!(url = %key, error = %err, "Discarding undecodable disk entry");
                    self.metrics.record_disk_miss();
                    if let Err(e) = self.disk.remove(key).await {
                        warn!(url = %key, error = %e, "Failed to remove disk entry");
                    }
                }
            },
            Ok(None) => self.metrics.record_disk_miss(),
            Err(err) => {
                warn!(url = %key, error = %err, "Disk read failed, falling back to network");
                self.metrics.record_disk_error();
                self.metrics.record_disk_miss();
            }
        }

        let tracker = LatencyTracker::start();
        let fetched = tokio::time::timeout(self.config.fetch_timeout(), self.fetcher.fetch(key.url()))
            .await
            .unwrap_or_else(|_| {
                Err(ImageError::Timeout {
                    url: key.url().to_string(),
                })
            });

        let decoded = match fetched {
            Ok(bytes) => CachedImage::decode_blocking(key.url(), bytes).await,
            Err(err) => Err(err),
        };
        let image = match decoded {
            Ok(image) => Arc::new(image),
            Err(err) => {
                self.metrics.record_fetch_failure();
                warn!(url = %key, error = %err, "Image fetch failed");
                return Err(err);
            }
        };
        self.metrics.record_network_fetch(tracker.elapsed());

        if let Err(err) = self.disk.put(key, image.bytes().clone()).await {
            self.metrics.record_disk_error();
            warn!(url = %key, error = %err, "Failed to persist image to disk");
        }
        self.store_in_memory(key, Arc::clone(&image));
        debug!(url = %key, bytes = image.size(), "Fetched from network");

        Ok(Served {
            image,
            source: ImageSource::Network,
        })
    }

    fn store_in_memory(&self, key: &CacheKey, image: Arc<CachedImage>) {
        let evicted = self.memory.insert(key.clone(), image);
        if evicted > 0 {
            self.metrics.record_memory_evictions(evicted);
        }
    }

    /// Drop the in-flight slot of a finished fetch.
    fn release_slot(&self, key: &CacheKey, id: u64) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(key).is_some_and(|entry| entry.id == id) {
            in_flight.remove(key);
        }
    }

    /// One waiter gave up; abort when nobody is left.
    fn withdraw(&self, key: &CacheKey, id: u64) {
        let mut in_flight = self.in_flight.lock();
        let Some(entry) = in_flight.get_mut(key) else {
            return;
        };
        if entry.id != id {
            return;
        }

        entry.interest -= 1;
        if entry.interest == 0 {
            entry.abort.abort();
            in_flight.remove(key);
            self.metrics.record_cancelled_fetch();
            debug!(url = %key, "Cancelled fetch with no remaining waiters");
        }
    }

    /// Fetches currently running
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    // =========================================================================
    // Bulk Loading
    // =========================================================================

    /// Load many URLs in the background with bounded concurrency.
    ///
    /// Dropping the handle does not stop the preload.
    pub fn preload<I>(self: &Arc<Self>, urls: I) -> PreloadHandle
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        let cache = Arc::clone(self);
        let concurrency = self.config.preload_concurrency.max(1);

        let handle = tokio::spawn(async move {
            let requested = urls.len();
            let outcomes: Vec<LoadResult> = stream::iter(urls)
                .map(|url| {
                    let cache = Arc::clone(&cache);
                    async move { cache.get_served(&url).await }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

            let mut report = PreloadReport {
                requested,
                ..Default::default()
            };
            for outcome in outcomes {
                match outcome {
                    Ok(Served {
                        source: ImageSource::Network,
                        ..
                    }) => report.fetched += 1,
                    Ok(_) => report.already_cached += 1,
                    Err(_) => report.failed += 1,
                }
            }

            info!(
                requested = report.requested,
                already_cached = report.already_cached,
                fetched = report.fetched,
                failed = report.failed,
                "Preload finished"
            );
            report
        });

        PreloadHandle { handle }
    }

    /// Preload only the first `limit` URLs
    pub fn warm<I>(self: &Arc<Self>, urls: I, limit: usize) -> PreloadHandle
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        debug!(limit, "Warming cache");
        self.preload(urls.into_iter().take(limit))
    }

    // =========================================================================
    // Inspection & Maintenance
    // =========================================================================

    /// Tier currently holding `url`. Never fetches or promotes.
    pub async fn cache_type_of(&self, url: &str) -> CacheType {
        let Ok(key) = CacheKey::parse(url) else {
            return CacheType::None;
        };
        if self.memory.contains(&key) {
            return CacheType::Memory;
        }
        match self.disk.contains(&key).await {
            Ok(true) => CacheType::Disk,
            Ok(false) => CacheType::None,
            Err(err) => {
                warn!(url = %key, error = %err, "Disk lookup failed");
                CacheType::None
            }
        }
    }

    /// Drop everything held in memory; disk is untouched.
    pub fn clear_memory(&self) {
        let dropped = self.memory.clear();
        self.metrics.record_memory_clear();
        info!(dropped, "Cleared memory cache");
    }

    /// Drop memory and disk contents
    pub async fn clear_all(&self) -> Result<()> {
        self.clear_memory();
        self.disk.clear().await?;
        info!("Cleared disk cache");
        Ok(())
    }

    /// Disk usage
    pub async fn size_report(&self) -> Result<DiskSizeReport> {
        self.disk.size_report().await
    }

    /// Expire and trim the disk tier now
    pub async fn sweep_disk(&self) -> Result<SweepReport> {
        self.disk.sweep().await
    }

    /// Sweep the disk tier every `period` until the task is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>, period: Duration) -> ScheduledTask {
        let cache = Arc::downgrade(self);
        ScheduledTask::every("disk-maintenance", period, move || {
            let cache = cache.clone();
            async move {
                let Some(cache) = cache.upgrade() else {
                    return;
                };
                if let Err(err) = cache.sweep_disk().await {
                    warn!(error = %err, "Disk maintenance failed");
                }
            }
        })
    }

    /// Memory pressure signal
    pub fn on_memory_warning(&self) {
        warn!("Memory warning received");
        self.clear_memory();
    }

    /// Shutdown hook; reports disk usage
    pub async fn on_terminate(&self) -> Result<DiskSizeReport> {
        let report = self.size_report().await?;
        info!(
            file_count = report.file_count,
            total_bytes = report.total_bytes,
            "Image cache at shutdown"
        );
        Ok(report)
    }

    /// Telemetry snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("memory", &self.memory)
            .field("disk", &self.disk)
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Request Future
// =============================================================================

struct InterestGuard {
    cache: Arc<ImageCache>,
    key: CacheKey,
    id: u64,
}

impl Drop for InterestGuard {
    fn drop(&mut self) {
        self.cache.withdraw(&self.key, self.id);
    }
}

enum RequestState {
    Ready(Option<LoadResult>),
    Waiting {
        future: SharedLoad,
        _interest: InterestGuard,
    },
}

/// Pending image lookup.
///
/// Resolves to the image and the tier that answered. Dropping it before
/// completion withdraws this caller's interest in the fetch.
#[must_use = "an ImageRequest does nothing unless awaited"]
pub struct ImageRequest {
    state: RequestState,
}

impl ImageRequest {
    fn ready(result: LoadResult) -> Self {
        Self {
            state: RequestState::Ready(Some(result)),
        }
    }
}

impl Future for ImageRequest {
    type Output = LoadResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            RequestState::Ready(result) => match result.take() {
                Some(result) => Poll::Ready(result),
                None => panic!("ImageRequest polled after completion"),
            },
            RequestState::Waiting { future, .. } => future.poll_unpin(cx),
        }
    }
}

impl std::fmt::Debug for ImageRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            RequestState::Ready(_) => "ready",
            RequestState::Waiting { .. } => "waiting",
        };
        f.debug_struct("ImageRequest").field("state", &state).finish()
    }
}

// =============================================================================
// Preload Handle
// =============================================================================

/// Preload summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    pub requested: usize,
    /// Answered by memory or disk
    pub already_cached: usize,
    /// Downloaded
    pub fetched: usize,
    pub failed: usize,
}

/// Background preload. Await it for the report.
#[derive(Debug)]
pub struct PreloadHandle {
    handle: JoinHandle<PreloadReport>,
}

impl PreloadHandle {
    /// Stop the preload; fetches already shared with other callers continue
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for PreloadHandle {
    type Output = Result<PreloadReport>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|joined| joined.map_err(|e| Error::Internal(format!("preload task failed: {e}"))))
    }
}

// =============================================================================
// Tests
// =============================================================================
