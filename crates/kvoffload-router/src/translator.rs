//! Logical to physical translation
//!
//! The only place a key is resolved to a physical read. The cache is looked
//! up again at execution time, independently of what the classifier saw,
//! because entries may be evicted, replaced or expire in between. A miss is
//! not an error: the request is forwarded to the host.

use crate::cache::LocationCache;
use crate::events::{EventSink, RoutingEvent, Stage};
use crate::stats::RoutingStats;
use kvoffload_common::{OpType, PhysicalReadOp, Request};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Why a request was sent back to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// The request has no usable key
    MissingKey,
    /// No live location for the key at execution time
    CacheMiss,
    /// Only GETs can be served on the offload path
    NotOffloadable(OpType),
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey => f.write_str("missing key"),
            Self::CacheMiss => f.write_str("cache miss"),
            Self::NotOffloadable(op) => write!(f, "{op} is not offloadable"),
        }
    }
}

/// Disposition of one offload-bound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// Read these bytes through the file service
    Read(PhysicalReadOp),
    /// Execute on the host instead
    ForwardToHost(Fallback),
}

impl Translation {
    #[must_use]
    pub const fn read_op(&self) -> Option<PhysicalReadOp> {
        match self {
            Self::Read(op) => Some(*op),
            Self::ForwardToHost(_) => None,
        }
    }

    #[must_use]
    pub const fn is_forward(&self) -> bool {
        matches!(self, Self::ForwardToHost(_))
    }
}

/// Resolves offload-bound requests against the location cache
pub struct Translator {
    cache: Arc<LocationCache>,
    stats: Arc<RoutingStats>,
    sink: Arc<dyn EventSink>,
}

impl Translator {
    #[must_use]
    pub fn new(
        cache: Arc<LocationCache>,
        stats: Arc<RoutingStats>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self { cache, stats, sink }
    }

    /// Translate one request; never fails
    pub fn translate(&self, request: &Request) -> Translation {
        let Some(key) = request.routing_key() else {
            RoutingStats::add(&self.stats.forwarded_missing_key, 1);
            self.sink.record(RoutingEvent::MissingKey {
                op: request.op,
                stage: Stage::Translate,
            });
            return Translation::ForwardToHost(Fallback::MissingKey);
        };

        if request.op != OpType::Get {
            RoutingStats::add(&self.stats.forwarded_not_offloadable, 1);
            self.sink.record(RoutingEvent::NotOffloadable {
                op: request.op,
                key: key.clone(),
            });
            return Translation::ForwardToHost(Fallback::NotOffloadable(request.op));
        }

        match self.cache.lookup(key) {
            Some(entry) => {
                let op = PhysicalReadOp::from(entry.location());
                RoutingStats::add(&self.stats.translated, 1);
                trace!(
                    %key,
                    file_id = op.file_id,
                    offset = op.offset,
                    size = op.size,
                    "translated"
                );
                Translation::Read(op)
            }
            None => {
                RoutingStats::add(&self.stats.forwarded_miss, 1);
                self.sink
                    .record(RoutingEvent::TranslateMiss { key: key.clone() });
                Translation::ForwardToHost(Fallback::CacheMiss)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::clock::{Clock, ManualClock};
    use crate::events::MemorySink;
    use kvoffload_common::{Key, PhysicalLocation};
    use std::time::Duration;

    fn setup() -> (Arc<ManualClock>, Arc<LocationCache>, Arc<MemorySink>, Translator) {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(LocationCache::with_clock(clock.clone()));
        let sink = Arc::new(MemorySink::default());
        let translator = Translator::new(
            cache.clone(),
            Arc::new(RoutingStats::default()),
            sink.clone(),
        );
        (clock, cache, sink, translator)
    }

    fn install(
        cache: &LocationCache,
        clock: &ManualClock,
        key: &'static str,
        loc: PhysicalLocation,
    ) {
        let entry = CacheEntry::new(loc, None, clock.now(), Duration::from_secs(10));
        cache.upsert(Key::from(key), entry).unwrap();
    }

    #[test]
    fn test_hit_translates_one_to_one() {
        let (clock, cache, sink, translator) = setup();
        install(&cache, &clock, "A", PhysicalLocation::new(1, 0, 128));

        let t = translator.translate(&Request::get("A"));
        assert_eq!(
            t,
            Translation::Read(PhysicalReadOp {
                file_id: 1,
                offset: 0,
                size: 128
            })
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_miss_forwards() {
        let (_, _, sink, translator) = setup();
        let t = translator.translate(&Request::get("A"));
        assert_eq!(t, Translation::ForwardToHost(Fallback::CacheMiss));
        assert_eq!(
            sink.events(),
            vec![RoutingEvent::TranslateMiss { key: Key::from("A") }]
        );
    }

    #[test]
    fn test_missing_key_forwards() {
        let (_, _, sink, translator) = setup();
        for request in [
            Request::other(1, None),
            Request::get(Key::copy_from_slice(b"")),
        ] {
            assert_eq!(
                translator.translate(&request),
                Translation::ForwardToHost(Fallback::MissingKey)
            );
        }
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_write_forwards() {
        let (clock, cache, _, translator) = setup();
        install(&cache, &clock, "A", PhysicalLocation::new(1, 0, 128));
        assert_eq!(
            translator.translate(&Request::put("A", "v")),
            Translation::ForwardToHost(Fallback::NotOffloadable(OpType::Put))
        );
    }

    #[test]
    fn test_revalidates_after_eviction() {
        let (clock, cache, _, translator) = setup();
        install(&cache, &clock, "A", PhysicalLocation::new(1, 0, 128));
        assert!(!translator.translate(&Request::get("A")).is_forward());

        cache.remove(&Key::from("A"));
        assert!(translator.translate(&Request::get("A")).is_forward());
    }

    #[test]
    fn test_revalidates_after_expiry() {
        let (clock, cache, _, translator) = setup();
        install(&cache, &clock, "A", PhysicalLocation::new(1, 0, 128));
        clock.advance(Duration::from_secs(10) + Duration::from_millis(1));
        assert_eq!(
            translator.translate(&Request::get("A")),
            Translation::ForwardToHost(Fallback::CacheMiss)
        );
    }

    #[test]
    fn test_uses_location_current_at_execution() {
        let (clock, cache, _, translator) = setup();
        install(&cache, &clock, "A", PhysicalLocation::new(1, 0, 128));
        install(&cache, &clock, "A", PhysicalLocation::new(2, 4096, 64));

        let op = translator.translate(&Request::get("A")).read_op().unwrap();
        assert_eq!((op.file_id, op.offset, op.size), (2, 4096, 64));
    }
}
