//! Cache Metrics Collection
//!
//! Hit/miss telemetry for the image cache tiers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // Memory tier
    memory_hits: AtomicU64,
    memory_misses: AtomicU64,
    memory_evictions: AtomicU64,
    memory_clears: AtomicU64,

    // Disk tier
    disk_hits: AtomicU64,
    disk_misses: AtomicU64,
    disk_errors: AtomicU64,

    // Network
    network_fetches: AtomicU64,
    fetch_failures: AtomicU64,
    coalesced_waits: AtomicU64,
    cancelled_fetches: AtomicU64,

    // Tier movement
    promotions: AtomicU64,

    // Network latency (microseconds, exponential moving average)
    fetch_latency_us: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    // Memory tier
    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memory_miss(&self) {
        self.memory_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memory_evictions(&self, count: usize) {
        self.memory_evictions
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_memory_clear(&self) {
        self.memory_clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn memory_hits(&self) -> u64 {
        self.memory_hits.load(Ordering::Relaxed)
    }

    pub fn memory_misses(&self) -> u64 {
        self.memory_misses.load(Ordering::Relaxed)
    }

    // Disk tier
    pub fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_miss(&self) {
        self.disk_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_error(&self) {
        self.disk_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disk_hits(&self) -> u64 {
        self.disk_hits.load(Ordering::Relaxed)
    }

    pub fn disk_misses(&self) -> u64 {
        self.disk_misses.load(Ordering::Relaxed)
    }

    // Network
    pub fn record_network_fetch(&self, latency: Duration) {
        self.network_fetches.fetch_add(1, Ordering::Relaxed);
        self.update_latency_ema(&self.fetch_latency_us, latency);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced_wait(&self) {
        self.coalesced_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled_fetch(&self) {
        self.cancelled_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn network_fetches(&self) -> u64 {
        self.network_fetches.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    fn update_latency_ema(&self, target: &AtomicU64, duration: Duration) {
        let new_us = duration.as_micros() as u64;
        let alpha = 0.1;

        loop {
            let current = target.load(Ordering::Relaxed);
            let updated = if current == 0 {
                new_us
            } else {
                ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
            };

            if target
                .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn fetch_latency(&self) -> Duration {
        Duration::from_micros(self.fetch_latency_us.load(Ordering::Relaxed))
    }

    /// Share of lookups answered without the network
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.memory_hits() + self.disk_hits();
        let total = hits + self.disk_misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            memory_hits: self.memory_hits(),
            memory_misses: self.memory_misses(),
            memory_evictions: self.memory_evictions.load(Ordering::Relaxed),
            memory_clears: self.memory_clears.load(Ordering::Relaxed),
            disk_hits: self.disk_hits(),
            disk_misses: self.disk_misses(),
            disk_errors: self.disk_errors.load(Ordering::Relaxed),
            network_fetches: self.network_fetches(),
            fetch_failures: self.fetch_failures(),
            coalesced_waits: self.coalesced_waits.load(Ordering::Relaxed),
            cancelled_fetches: self.cancelled_fetches.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            fetch_latency: self.fetch_latency(),
            hit_ratio: self.hit_ratio(),
        }
    }
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub memory_hits: u64,
    pub memory_misses: u64,
    pub memory_evictions: u64,
    pub memory_clears: u64,

    pub disk_hits: u64,
    pub disk_misses: u64,
    pub disk_errors: u64,

    pub network_fetches: u64,
    pub fetch_failures: u64,
    pub coalesced_waits: u64,
    pub cancelled_fetches: u64,

    /// Disk hits copied into memory
    pub promotions: u64,

    pub fetch_latency: Duration,
    pub hit_ratio: f64,
}

/// Latency tracker helper
pub(crate) struct LatencyTracker {
    start: Instant,
}

impl LatencyTracker {
    pub(crate) fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

// =============================================================================
// Tests
// =============================================================================
