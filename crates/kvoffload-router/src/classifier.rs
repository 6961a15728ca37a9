//! Batch classification
//!
//! Splits an incoming batch into host-bound and offload-bound requests. A GET
//! is offload-bound only if its key currently has a live cache entry;
//! everything else goes to the host. The decision is advisory: the
//! translator looks the key up again before anything is read.
//!
//! Both partitions keep the relative order the requests had in the batch.

use crate::cache::LocationCache;
use crate::events::{EventSink, RoutingEvent, Stage};
use crate::stats::RoutingStats;
use kvoffload_common::{Batch, IntraBatchOrdering, Key, OpType, Request};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// The two ordered partitions of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub host: Vec<Request>,
    pub offload: Vec<Request>,
}

impl Classification {
    #[must_use]
    pub fn len(&self) -> usize {
        self.host.len() + self.offload.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.host.is_empty() && self.offload.is_empty()
    }
}

/// Requests paired with their position in the original batch
pub(crate) type Tagged = Vec<(usize, Request)>;

/// Routes each request of a batch to the host or offload path
pub struct Classifier {
    cache: Arc<LocationCache>,
    ordering: IntraBatchOrdering,
    stats: Arc<RoutingStats>,
    sink: Arc<dyn EventSink>,
}

impl Classifier {
    #[must_use]
    pub fn new(
        cache: Arc<LocationCache>,
        ordering: IntraBatchOrdering,
        stats: Arc<RoutingStats>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            cache,
            ordering,
            stats,
            sink,
        }
    }

    #[must_use]
    pub const fn ordering(&self) -> IntraBatchOrdering {
        self.ordering
    }

    /// Partition a batch; reads the cache but never modifies it
    pub fn classify(&self, batch: Batch) -> Classification {
        let (host, offload) = self.partition(batch);
        Classification {
            host: host.into_iter().map(|(_, r)| r).collect(),
            offload: offload.into_iter().map(|(_, r)| r).collect(),
        }
    }

    /// Partition a batch, tagging each request with its position in the batch
    pub(crate) fn partition(&self, batch: Batch) -> (Tagged, Tagged) {
        let mut host = Vec::with_capacity(batch.len());
        let mut offload = Vec::new();
        // Keys written earlier in this batch, tracked only when shadowing reads
        let mut written: HashSet<Key> = HashSet::new();
        let mut shadowed = 0u64;

        for (pos, request) in batch.into_iter().enumerate() {
            if self.is_offloadable(&request, &written, &mut shadowed) {
                offload.push((pos, request));
                continue;
            }
            if self.ordering == IntraBatchOrdering::WritesShadowReads
                && request.op.may_mutate()
                && let Some(key) = request.routing_key()
            {
                written.insert(key.clone());
            }
            host.push((pos, request));
        }

        RoutingStats::add(&self.stats.batches, 1);
        RoutingStats::add(&self.stats.classified_host, host.len() as u64);
        RoutingStats::add(&self.stats.classified_offload, offload.len() as u64);
        RoutingStats::add(&self.stats.shadowed_reads, shadowed);
        trace!(host = host.len(), offload = offload.len(), "classified batch");
        (host, offload)
    }

    fn is_offloadable(
        &self,
        request: &Request,
        written: &HashSet<Key>,
        shadowed: &mut u64,
    ) -> bool {
        if request.op != OpType::Get {
            return false;
        }
        let Some(key) = request.routing_key() else {
            self.sink.record(RoutingEvent::MissingKey {
                op: request.op,
                stage: Stage::Classify,
            });
            return false;
        };
        if written.contains(key) {
            *shadowed += 1;
            return false;
        }
        self.cache.lookup(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::clock::{Clock, ManualClock};
    use crate::events::MemorySink;
    use kvoffload_common::PhysicalLocation;
    use std::time::Duration;

    struct Fixture {
        clock: Arc<ManualClock>,
        cache: Arc<LocationCache>,
        sink: Arc<MemorySink>,
        stats: Arc<RoutingStats>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new());
            Self {
                cache: Arc::new(LocationCache::with_clock(clock.clone())),
                clock,
                sink: Arc::new(MemorySink::default()),
                stats: Arc::new(RoutingStats::default()),
            }
        }

        fn cache_key(&self, key: &'static str) {
            let entry = CacheEntry::new(
                PhysicalLocation::new(1, 0, 128),
                None,
                self.clock.now(),
                Duration::from_secs(10),
            );
            self.cache.upsert(Key::from(key), entry).unwrap();
        }

        fn classifier(&self, ordering: IntraBatchOrdering) -> Classifier {
            Classifier::new(
                self.cache.clone(),
                ordering,
                self.stats.clone(),
                self.sink.clone(),
            )
        }
    }

    #[test]
    fn test_mixed_batch() {
        let fx = Fixture::new();
        fx.cache_key("A");

        let result = fx.classifier(IntraBatchOrdering::Concurrent).classify(vec![
            Request::get("A"),
            Request::put("B", "v"),
            Request::get("C"),
            Request::delete("A"),
        ]);

        assert_eq!(result.offload, vec![Request::get("A")]);
        assert_eq!(
            result.host,
            vec![Request::put("B", "v"), Request::get("C"), Request::delete("A")]
        );
    }

    #[test]
    fn test_empty_batch() {
        let fx = Fixture::new();
        let result = fx.classifier(IntraBatchOrdering::Concurrent).classify(Vec::new());
        assert!(result.is_empty());
        assert_eq!(fx.stats.batches.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_writes_and_unknown_ops_always_host() {
        let fx = Fixture::new();
        fx.cache_key("A");

        let batch = vec![
            Request::put("A", "v"),
            Request::delete("A"),
            Request::other(99, Some(Key::from("A"))),
            Request::other(100, None),
        ];
        let result = fx.classifier(IntraBatchOrdering::Concurrent).classify(batch.clone());
        assert!(result.offload.is_empty());
        assert_eq!(result.host, batch);
    }

    #[test]
    fn test_expired_entry_goes_to_host() {
        let fx = Fixture::new();
        fx.cache_key("A");
        fx.clock.advance(Duration::from_secs(11));

        let result = fx
            .classifier(IntraBatchOrdering::Concurrent)
            .classify(vec![Request::get("A")]);
        assert_eq!(result.host, vec![Request::get("A")]);
    }

    #[test]
    fn test_get_without_key_goes_to_host() {
        let fx = Fixture::new();
        let keyless = Request {
            op: OpType::Get,
            key: None,
            payload: None,
        };

        let result = fx
            .classifier(IntraBatchOrdering::Concurrent)
            .classify(vec![keyless.clone()]);
        assert_eq!(result.host, vec![keyless]);
        assert_eq!(
            fx.sink.events(),
            vec![RoutingEvent::MissingKey {
                op: OpType::Get,
                stage: Stage::Classify
            }]
        );
    }

    #[test]
    fn test_classification_does_not_mutate_cache() {
        let fx = Fixture::new();
        fx.cache_key("A");
        fx.classifier(IntraBatchOrdering::Concurrent)
            .classify(vec![Request::get("A"), Request::get("Z")]);
        assert_eq!(fx.cache.len(), 1);
        assert!(fx.cache.lookup(&Key::from("Z")).is_none());
    }

    #[test]
    fn test_concurrent_ordering_ignores_same_batch_put() {
        let fx = Fixture::new();
        fx.cache_key("A");

        let result = fx.classifier(IntraBatchOrdering::Concurrent).classify(vec![
            Request::put("A", "new"),
            Request::get("A"),
        ]);
        assert_eq!(result.offload, vec![Request::get("A")]);
        assert_eq!(result.host, vec![Request::put("A", "new")]);
    }

    #[test]
    fn test_writes_shadow_later_reads() {
        let fx = Fixture::new();
        fx.cache_key("A");
        fx.cache_key("B");

        let result = fx.classifier(IntraBatchOrdering::WritesShadowReads).classify(vec![
            Request::get("A"),
            Request::put("A", "new"),
            Request::get("A"),
            Request::get("B"),
            Request::delete("B"),
        ]);

        // The GET before the write still offloads; the one after does not.
        assert_eq!(result.offload, vec![Request::get("A"), Request::get("B")]);
        assert_eq!(
            result.host,
            vec![
                Request::put("A", "new"),
                Request::get("A"),
                Request::delete("B")
            ]
        );
        assert_eq!(
            fx.stats.shadowed_reads.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }
}
