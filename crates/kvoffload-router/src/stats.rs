//! Routing statistics
//!
//! Relaxed atomic counters updated on the hot path, plus a plain snapshot
//! type that combines them with the cache counters for export.

use crate::cache::CacheStats;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for classification and translation outcomes
#[derive(Debug, Default)]
pub struct RoutingStats {
    pub batches: AtomicU64,
    pub classified_host: AtomicU64,
    pub classified_offload: AtomicU64,
    /// GETs sent to the host because an earlier same-batch request wrote the key
    pub shadowed_reads: AtomicU64,
    pub translated: AtomicU64,
    pub forwarded_missing_key: AtomicU64,
    pub forwarded_miss: AtomicU64,
    pub forwarded_not_offloadable: AtomicU64,
    pub write_results: AtomicU64,
    pub host_reads: AtomicU64,
    pub evictions: AtomicU64,
}

impl RoutingStats {
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Reset all statistics
    pub fn reset(&self) {
        for counter in [
            &self.batches,
            &self.classified_host,
            &self.classified_offload,
            &self.shadowed_reads,
            &self.translated,
            &self.forwarded_missing_key,
            &self.forwarded_miss,
            &self.forwarded_not_offloadable,
            &self.write_results,
            &self.host_reads,
            &self.evictions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Requests the translator sent back to the host, for any reason
    #[must_use]
    pub fn forwarded(&self) -> u64 {
        self.forwarded_missing_key.load(Ordering::Relaxed)
            + self.forwarded_miss.load(Ordering::Relaxed)
            + self.forwarded_not_offloadable.load(Ordering::Relaxed)
    }
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub batches: u64,
    pub classified_host: u64,
    pub classified_offload: u64,
    pub shadowed_reads: u64,
    pub translated: u64,
    pub forwarded_missing_key: u64,
    pub forwarded_miss: u64,
    pub forwarded_not_offloadable: u64,
    pub write_results: u64,
    pub host_reads: u64,
    pub evictions: u64,
    pub cache_lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_expired: u64,
    pub cache_inserted: u64,
    pub cache_replaced: u64,
    pub cache_stale: u64,
    pub cache_rejected: u64,
    pub cache_removed: u64,
    pub cache_purged: u64,
    /// Entries currently stored, expired or not
    pub cache_entries: u64,
}

impl StatsSnapshot {
    /// Capture routing and cache counters together
    #[must_use]
    pub fn capture(routing: &RoutingStats, cache: &CacheStats, cache_entries: usize) -> Self {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        Self {
            batches: load(&routing.batches),
            classified_host: load(&routing.classified_host),
            classified_offload: load(&routing.classified_offload),
            shadowed_reads: load(&routing.shadowed_reads),
            translated: load(&routing.translated),
            forwarded_missing_key: load(&routing.forwarded_missing_key),
            forwarded_miss: load(&routing.forwarded_miss),
            forwarded_not_offloadable: load(&routing.forwarded_not_offloadable),
            write_results: load(&routing.write_results),
            host_reads: load(&routing.host_reads),
            evictions: load(&routing.evictions),
            cache_lookups: load(&cache.lookups),
            cache_hits: load(&cache.hits),
            cache_misses: load(&cache.misses),
            cache_expired: load(&cache.expired),
            cache_inserted: load(&cache.inserted),
            cache_replaced: load(&cache.replaced),
            cache_stale: load(&cache.stale),
            cache_rejected: load(&cache.rejected),
            cache_removed: load(&cache.removed),
            cache_purged: load(&cache.purged),
            cache_entries: cache_entries as u64,
        }
    }

    /// Fraction of cache lookups that found a live entry (0.0 to 1.0)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Fraction of offload-bound GETs that were actually served from a location
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn offload_ratio(&self) -> f64 {
        let total = self.translated + self.forwarded_miss;
        if total == 0 {
            0.0
        } else {
            self.translated as f64 / total as f64
        }
    }
}
