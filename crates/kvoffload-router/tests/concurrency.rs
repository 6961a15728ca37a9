//! Concurrent writers, readers and evictors racing on one cache.

use kvoffload_common::{Config, Key, PhysicalLocation, ReadOp, Request, WriteResult};
use kvoffload_router::{
    CacheEntry, LocationCache, ManualClock, MemorySink, OffloadRouter, SystemClock, Translation,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const THREADS: usize = 4;
const ROUNDS: u64 = 2_000;

/// Every location written for key `k` at version `v` is `(k, v * 16, 16)`,
/// so any observed entry can be checked for internal consistency.
fn location_for(key_index: u64, version: u64) -> PhysicalLocation {
    PhysicalLocation::new(key_index, version * 16, 16)
}

#[test]
fn test_lookups_never_see_torn_entries() {
    let cache = Arc::new(LocationCache::with_clock(Arc::new(SystemClock)));
    let stop = AtomicBool::new(false);

    thread::scope(|s| {
        for w in 0..THREADS as u64 {
            let cache = cache.clone();
            s.spawn(move || {
                for v in 0..ROUNDS {
                    let key_index = (v + w) % 8;
                    let entry = CacheEntry::new(
                        location_for(key_index, v),
                        Some(v.into()),
                        std::time::Instant::now(),
                        Duration::from_secs(60),
                    );
                    cache.upsert(Key::from(format!("k{key_index}")), entry).unwrap();
                    if v % 7 == 0 {
                        cache.remove(&Key::from(format!("k{}", (v + 3) % 8)));
                    }
                }
            });
        }

        for _ in 0..THREADS {
            let cache = cache.clone();
            let stop = &stop;
            s.spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    for key_index in 0..8u64 {
                        if let Some(entry) = cache.lookup(&Key::from(format!("k{key_index}"))) {
                            let version = entry.version().unwrap().get();
                            assert_eq!(entry.location(), location_for(key_index, version));
                        }
                    }
                }
            });
        }

        // Writers finish on their own; stop readers afterwards.
        thread::sleep(Duration::from_millis(200));
        stop.store(true, Ordering::Relaxed);
    });
}

#[test]
fn test_concurrent_versions_converge_to_max() {
    let cache = Arc::new(LocationCache::with_clock(Arc::new(ManualClock::new())));
    let clock = cache.clock().clone();

    thread::scope(|s| {
        for w in 0..THREADS as u64 {
            let cache = cache.clone();
            let clock = clock.clone();
            s.spawn(move || {
                // Each writer walks the version space in a different order
                let versions: Vec<u64> = if w % 2 == 0 {
                    (0..ROUNDS).collect()
                } else {
                    (0..ROUNDS).rev().collect()
                };
                for v in versions {
                    let entry = CacheEntry::new(
                        location_for(0, v),
                        Some(v.into()),
                        clock.now(),
                        Duration::from_secs(60),
                    );
                    cache.upsert(Key::from("hot"), entry).unwrap();
                }
            });
        }
    });

    let entry = cache.lookup(&Key::from("hot")).unwrap();
    assert_eq!(entry.version().unwrap().get(), ROUNDS - 1);
    assert_eq!(entry.location(), location_for(0, ROUNDS - 1));
}

#[test]
fn test_router_under_concurrent_commits_and_reads() {
    let router = Arc::new(
        OffloadRouter::with_parts(
            &Config::default(),
            Arc::new(SystemClock),
            Arc::new(MemorySink::new(128)),
        )
        .unwrap(),
    );

    thread::scope(|s| {
        let committer = router.clone();
        s.spawn(move || {
            for v in 0..ROUNDS {
                let key = format!("k{}", v % 16);
                committer.on_writes_committed(&[
                    WriteResult::new(key, location_for(v % 16, v)).with_version(v),
                ]);
            }
        });

        let reader = router.clone();
        s.spawn(move || {
            for v in 0..ROUNDS {
                reader.on_host_read(&ReadOp::new([format!("k{}", (v * 5) % 16)]));
            }
        });

        for _ in 0..2 {
            let offload = router.clone();
            s.spawn(move || {
                for v in 0..ROUNDS {
                    let batch: Vec<Request> =
                        (0..4).map(|i| Request::get(format!("k{}", (v + i) % 16))).collect();
                    let dispatch = offload.dispatch(batch);
                    assert_eq!(dispatch.host.len() + dispatch.offloaded.len(), 4);
                    for (request, op) in &dispatch.offloaded {
                        let key = request.routing_key().unwrap();
                        let index: u64 = std::str::from_utf8(&key.as_bytes()[1..])
                            .unwrap()
                            .parse()
                            .unwrap();
                        assert_eq!(op.file_id, index);
                        assert_eq!(op.size, 16);
                        assert_eq!(op.offset % 16, 0);
                    }
                }
            });
        }
    });

    let stats = router.stats();
    assert_eq!(stats.write_results, ROUNDS);
    assert_eq!(stats.host_reads, ROUNDS);
    assert_eq!(
        stats.classified_offload,
        stats.translated + stats.forwarded_miss
    );
    assert!(matches!(
        router.translate(&Request::get("never-written")),
        Translation::ForwardToHost(_)
    ));
}
