//! Location cache for the offload path
//!
//! Maps logical keys to the physical location of their most recently
//! committed record. Entries are hints: they are created only when a host
//! write commits, dropped when the host reads the key, and treated as absent
//! once their time-to-live has elapsed.
//!
//! The table is a sharded [`DashMap`]. Every operation touches exactly one
//! shard, so operations on keys in different shards never contend and no lock
//! ever spans the whole table. Per-key operations are linearizable: a lookup
//! copies the entry out under the shard's read lock and never observes a
//! partially written value.
//!
//! Expiry is lazy. Nothing runs in the background; [`LocationCache::purge_expired`]
//! exists only to bound memory and is never needed for correctness.

use crate::clock::Clock;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use kvoffload_common::{CacheConfig, Error, Key, PhysicalLocation, Result, Version};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Cached physical location of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEntry {
    /// Location from a write that carried a version
    Versioned {
        location: PhysicalLocation,
        version: Version,
        created_at: Instant,
        ttl: Duration,
    },
    /// Location from a write without version information
    Unversioned {
        location: PhysicalLocation,
        created_at: Instant,
        ttl: Duration,
    },
}

impl CacheEntry {
    /// Build an entry, choosing the variant from the presence of a version
    #[must_use]
    pub const fn new(
        location: PhysicalLocation,
        version: Option<Version>,
        created_at: Instant,
        ttl: Duration,
    ) -> Self {
        match version {
            Some(version) => Self::Versioned {
                location,
                version,
                created_at,
                ttl,
            },
            None => Self::Unversioned {
                location,
                created_at,
                ttl,
            },
        }
    }

    #[must_use]
    pub const fn location(&self) -> PhysicalLocation {
        match self {
            Self::Versioned { location, .. } | Self::Unversioned { location, .. } => *location,
        }
    }

    #[must_use]
    pub const fn version(&self) -> Option<Version> {
        match self {
            Self::Versioned { version, .. } => Some(*version),
            Self::Unversioned { .. } => None,
        }
    }

    #[must_use]
    pub const fn created_at(&self) -> Instant {
        match self {
            Self::Versioned { created_at, .. } | Self::Unversioned { created_at, .. } => {
                *created_at
            }
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        match self {
            Self::Versioned { ttl, .. } | Self::Unversioned { ttl, .. } => *ttl,
        }
    }

    /// An entry is expired once strictly more than `ttl` has passed since creation
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at()) > self.ttl()
    }

    /// Reject entries that could never describe a readable record
    pub fn validate(&self) -> Result<()> {
        self.location().validate()?;
        if self.ttl().is_zero() {
            return Err(Error::invalid_entry("ttl must be non-zero"));
        }
        Ok(())
    }
}

/// Result of an accepted [`LocationCache::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No entry was stored for the key
    Inserted,
    /// An existing entry was overwritten
    Replaced { previous: CacheEntry },
    /// The incoming entry was older than the stored one and was dropped
    Stale { retained: Version, incoming: Version },
}

impl UpsertOutcome {
    /// Whether the incoming entry is now the stored one
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        !matches!(self, Self::Stale { .. })
    }
}

/// A pending cache installation produced from a committed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertCommand {
    pub key: Key,
    pub entry: CacheEntry,
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    pub lookups: AtomicU64,
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    /// Misses caused by an entry whose ttl had elapsed
    pub expired: AtomicU64,
    pub inserted: AtomicU64,
    pub replaced: AtomicU64,
    pub stale: AtomicU64,
    pub rejected: AtomicU64,
    pub removed: AtomicU64,
    pub purged: AtomicU64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 { 0.0 } else { hits / total }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        for counter in [
            &self.lookups,
            &self.hits,
            &self.misses,
            &self.expired,
            &self.inserted,
            &self.replaced,
            &self.stale,
            &self.rejected,
            &self.removed,
            &self.purged,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Concurrent key to physical location cache
///
/// Shared between components through an `Arc<LocationCache>` handle.
#[derive(Debug)]
pub struct LocationCache {
    entries: DashMap<Key, CacheEntry>,
    clock: Arc<dyn Clock>,
    /// Compare versions on upsert; otherwise last-applied-wins
    versioning: bool,
    stats: CacheStats,
}

impl LocationCache {
    /// Create a cache from configuration
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let entries = match config.shards {
            Some(shards) => DashMap::with_shard_amount(shards),
            None => DashMap::new(),
        };
        Ok(Self {
            entries,
            clock,
            versioning: config.versioning,
            stats: CacheStats::default(),
        })
    }

    /// Create a cache with default configuration on the given clock
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            versioning: true,
            stats: CacheStats::default(),
        }
    }

    /// The clock entries are checked against
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Whether version-based conflict resolution is enabled
    #[must_use]
    pub const fn versioning(&self) -> bool {
        self.versioning
    }

    /// Look up the live entry for a key
    ///
    /// Returns `None` if nothing is stored or the stored entry has expired.
    /// Never blocks on another shard and never mutates the table.
    pub fn lookup(&self, key: &Key) -> Option<CacheEntry> {
        CacheStats::bump(&self.stats.lookups);
        let stored = self.entries.get(key).map(|r| *r.value());
        match stored {
            Some(entry) if !entry.is_expired_at(self.clock.now()) => {
                CacheStats::bump(&self.stats.hits);
                Some(entry)
            }
            Some(_) => {
                trace!(%key, "location expired");
                CacheStats::bump(&self.stats.expired);
                CacheStats::bump(&self.stats.misses);
                None
            }
            None => {
                CacheStats::bump(&self.stats.misses);
                None
            }
        }
    }

    /// Install or replace the entry for a key
    ///
    /// When versioning is enabled and both the stored and incoming entries
    /// carry a version, the incoming entry replaces the stored one only if its
    /// version is not lower; otherwise it is dropped and [`UpsertOutcome::Stale`]
    /// is returned. If either side lacks a version, the incoming entry always
    /// wins. An expired stored entry counts as absent, the same as for
    /// [`lookup`](Self::lookup), so the outcome never depends on whether
    /// [`purge_expired`](Self::purge_expired) ran first.
    ///
    /// Structurally invalid entries are rejected with an error and leave the
    /// table unchanged.
    pub fn upsert(&self, key: Key, entry: CacheEntry) -> Result<UpsertOutcome> {
        if key.is_empty() {
            CacheStats::bump(&self.stats.rejected);
            return Err(Error::EmptyKey);
        }
        if let Err(e) = entry.validate() {
            CacheStats::bump(&self.stats.rejected);
            debug!(%key, error = %e, "rejected cache entry");
            return Err(e);
        }

        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) if occupied.get().is_expired_at(self.clock.now()) => {
                occupied.insert(entry);
                CacheStats::bump(&self.stats.inserted);
                Ok(UpsertOutcome::Inserted)
            }
            Entry::Occupied(mut occupied) => {
                let current = *occupied.get();
                if self.versioning
                    && let (Some(retained), Some(incoming)) = (current.version(), entry.version())
                    && incoming < retained
                {
                    CacheStats::bump(&self.stats.stale);
                    debug!(
                        key = %occupied.key(),
                        %retained,
                        %incoming,
                        "dropped out-of-order location"
                    );
                    return Ok(UpsertOutcome::Stale { retained, incoming });
                }
                let previous = occupied.insert(entry);
                CacheStats::bump(&self.stats.replaced);
                Ok(UpsertOutcome::Replaced { previous })
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                CacheStats::bump(&self.stats.inserted);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// Remove the entry for a key
    ///
    /// Idempotent. Returns `true` only if a live entry was removed; an expired
    /// entry is dropped as well but reported as absent, matching what
    /// [`lookup`](Self::lookup) would have said.
    pub fn remove(&self, key: &Key) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                let live = !entry.is_expired_at(self.clock.now());
                if live {
                    CacheStats::bump(&self.stats.removed);
                }
                live
            }
            None => false,
        }
    }

    /// Apply upsert commands in order
    pub fn apply_upserts<I>(&self, commands: I) -> Vec<Result<UpsertOutcome>>
    where
        I: IntoIterator<Item = UpsertCommand>,
    {
        commands
            .into_iter()
            .map(|cmd| self.upsert(cmd.key, cmd.entry))
            .collect()
    }

    /// Remove each key; returns how many live entries were dropped
    pub fn apply_evictions<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a Key>,
    {
        keys.into_iter().filter(|key| self.remove(key)).count()
    }

    /// Drop every expired entry; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut purged = 0usize;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired_at(now);
            if !keep {
                purged += 1;
            }
            keep
        });
        self.stats
            .purged
            .fetch_add(purged as u64, Ordering::Relaxed);
        if purged > 0 {
            debug!(purged, "purged expired locations");
        }
        purged
    }

    /// Drop every entry, as after a restart
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet purged
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    #[must_use]
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
