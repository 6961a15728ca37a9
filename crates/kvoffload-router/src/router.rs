//! Offload router
//!
//! Wires the classifier, translator, populator and invalidator to one shared
//! location cache and closes the loop:
//!
//! ```text
//!   batch ──► Classifier ──► offload ──► Translator ──► PhysicalReadOp
//!                 │                          │
//!                 ▼                          ▼ (fallback)
//!               host ◄───────────────────────┘
//!                 │
//!      commits ───┼──► Populator ──► LocationCache.upsert
//!      reads   ───┴──► Invalidator ─► LocationCache.remove
//! ```

use crate::cache::{LocationCache, UpsertOutcome};
use crate::classifier::{Classification, Classifier};
use crate::clock::{Clock, SystemClock};
use crate::events::{EventSink, RoutingEvent, TracingSink};
use crate::invalidator::Invalidator;
use crate::populator::Populator;
use crate::stats::{RoutingStats, StatsSnapshot};
use crate::translator::{Translation, Translator};
use kvoffload_common::{Batch, Config, PhysicalReadOp, ReadOp, Request, Result, WriteResult};
use std::sync::Arc;
use tracing::{debug, info};

/// A fully resolved batch: every request has exactly one disposition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Requests for the host, in batch order, including forwarded GETs
    pub host: Vec<Request>,
    /// GETs served on the offload path with their physical reads, in batch order
    pub offloaded: Vec<(Request, PhysicalReadOp)>,
    /// How many offload-bound GETs fell back to the host at translation
    pub forwarded: usize,
}

/// What happened to a set of committed writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub applied: usize,
    pub stale: usize,
    pub rejected: usize,
}

/// Routing and coherence layer over one location cache
pub struct OffloadRouter {
    cache: Arc<LocationCache>,
    classifier: Classifier,
    translator: Translator,
    populator: Populator,
    invalidator: Invalidator,
    stats: Arc<RoutingStats>,
    sink: Arc<dyn EventSink>,
}

impl OffloadRouter {
    /// Create a router on the system clock that logs events through `tracing`
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_parts(config, Arc::new(SystemClock), Arc::new(TracingSink))
    }

    /// Create a router with an explicit clock and event sink
    pub fn with_parts(
        config: &Config,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(LocationCache::new(&config.cache, clock.clone())?);
        let stats = Arc::new(RoutingStats::default());

        info!(
            ttl_ms = config.cache.ttl_ms,
            versioning = config.cache.versioning,
            intra_batch = ?config.routing.intra_batch,
            "offload router initialized"
        );

        Ok(Self {
            classifier: Classifier::new(
                cache.clone(),
                config.routing.intra_batch,
                stats.clone(),
                sink.clone(),
            ),
            translator: Translator::new(cache.clone(), stats.clone(), sink.clone()),
            populator: Populator::new(config.cache.ttl(), clock),
            invalidator: Invalidator::new(),
            cache,
            stats,
            sink,
        })
    }

    /// Shared handle to the location cache
    #[must_use]
    pub const fn cache(&self) -> &Arc<LocationCache> {
        &self.cache
    }

    /// Split a batch into host-bound and offload-bound requests
    pub fn classify(&self, batch: Batch) -> Classification {
        self.classifier.classify(batch)
    }

    /// Resolve one offload-bound request at execution time
    pub fn translate(&self, request: &Request) -> Translation {
        self.translator.translate(request)
    }

    /// Translate each request in order
    pub fn translate_all(&self, requests: &[Request]) -> Vec<Translation> {
        requests.iter().map(|r| self.translate(r)).collect()
    }

    /// Classify and immediately translate a batch
    ///
    /// GETs that miss at translation rejoin the host queue at their original
    /// batch position, so the host sees requests in batch order.
    pub fn dispatch(&self, batch: Batch) -> Dispatch {
        let (mut host, offload) = self.classifier.partition(batch);
        let mut offloaded = Vec::with_capacity(offload.len());
        let mut forwarded = 0;

        for (pos, request) in offload {
            match self.translator.translate(&request) {
                Translation::Read(op) => offloaded.push((request, op)),
                Translation::ForwardToHost(_) => {
                    forwarded += 1;
                    host.push((pos, request));
                }
            }
        }
        if forwarded > 0 {
            host.sort_by_key(|(pos, _)| *pos);
        }

        Dispatch {
            host: host.into_iter().map(|(_, r)| r).collect(),
            offloaded,
            forwarded,
        }
    }

    /// Install locations for committed host writes (cache-on-write)
    pub fn on_writes_committed(&self, results: &[WriteResult]) -> CommitReport {
        RoutingStats::add(&self.stats.write_results, results.len() as u64);
        let mut report = CommitReport::default();

        for command in self.populator.populate(results) {
            let key = command.key.clone();
            match self.cache.upsert(command.key, command.entry) {
                Ok(UpsertOutcome::Stale { retained, incoming }) => {
                    report.stale += 1;
                    self.sink.record(RoutingEvent::StaleWriteDropped {
                        key,
                        retained,
                        incoming,
                    });
                }
                Ok(_) => report.applied += 1,
                Err(e) => {
                    report.rejected += 1;
                    self.sink.record(RoutingEvent::InvalidEntryRejected {
                        key,
                        reason: e.to_string(),
                    });
                }
            }
        }
        debug!(
            applied = report.applied,
            stale = report.stale,
            rejected = report.rejected,
            "applied write commits"
        );
        report
    }

    /// Evict every key the host read (invalidate-on-read)
    ///
    /// Returns how many live entries were dropped. Repeating the same read
    /// is harmless and evicts nothing further.
    pub fn on_host_read(&self, read: &ReadOp) -> usize {
        RoutingStats::add(&self.stats.host_reads, 1);
        let mut evicted = 0;
        for key in self.invalidator.invalidate(read) {
            if self.cache.remove(&key) {
                evicted += 1;
                self.sink.record(RoutingEvent::Evicted { key });
            }
        }
        RoutingStats::add(&self.stats.evictions, evicted as u64);
        evicted
    }

    /// Reclaim memory held by expired entries
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Snapshot of routing and cache counters
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot::capture(&self.stats, self.cache.stats(), self.cache.len())
    }

    /// Zero all counters
    pub fn reset_stats(&self) {
        self.stats.reset();
        self.cache.stats().reset();
    }
}
