//! Cache-on-write population
//!
//! Projects committed host writes into cache upsert commands. The
//! projection is pure and order-preserving: one command per write result, in
//! input order. Conflict resolution happens later, in
//! [`LocationCache::upsert`](crate::cache::LocationCache::upsert).

use crate::cache::{CacheEntry, UpsertCommand};
use crate::clock::Clock;
use kvoffload_common::WriteResult;
use std::sync::Arc;
use std::time::Duration;

/// Turns write results into upsert commands stamped with a ttl
#[derive(Debug, Clone)]
pub struct Populator {
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl Populator {
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { ttl, clock }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// One command per result, same order, all stamped with the current time
    #[must_use]
    pub fn populate(&self, results: &[WriteResult]) -> Vec<UpsertCommand> {
        let now = self.clock.now();
        results
            .iter()
            .map(|result| UpsertCommand {
                key: result.key.clone(),
                entry: CacheEntry::new(result.location, result.version, now, self.ttl),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use kvoffload_common::{Key, PhysicalLocation, Version};

    #[test]
    fn test_populate_stamps_entries() {
        let clock = Arc::new(ManualClock::new());
        clock.advance(Duration::from_secs(3));
        let populator = Populator::new(Duration::from_millis(10_000), clock.clone());

        let commands = populator.populate(&[
            WriteResult::new("a", PhysicalLocation::new(1, 0, 128)).with_version(5),
        ]);

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].key, Key::from("a"));
        let entry = commands[0].entry;
        assert_eq!(entry.location(), PhysicalLocation::new(1, 0, 128));
        assert_eq!(entry.version(), Some(Version::new(5)));
        assert_eq!(entry.ttl(), Duration::from_millis(10_000));
        assert_eq!(entry.created_at(), clock.now());
    }

    #[test]
    fn test_populate_preserves_order_and_duplicates() {
        let clock = Arc::new(ManualClock::new());
        let populator = Populator::new(Duration::from_secs(1), clock);

        let results = vec![
            WriteResult::new("b", PhysicalLocation::new(2, 0, 10)).with_version(2),
            WriteResult::new("a", PhysicalLocation::new(2, 10, 10)),
            WriteResult::new("b", PhysicalLocation::new(2, 20, 10)).with_version(1),
        ];
        let commands = populator.populate(&results);

        let keys: Vec<_> = commands.iter().map(|c| c.key.clone()).collect();
        assert_eq!(keys, vec![Key::from("b"), Key::from("a"), Key::from("b")]);
        assert!(matches!(commands[1].entry, CacheEntry::Unversioned { .. }));
        assert_eq!(commands[2].entry.version(), Some(Version::new(1)));
    }

    #[test]
    fn test_populate_empty() {
        let populator = Populator::new(Duration::from_secs(1), Arc::new(ManualClock::new()));
        assert!(populator.populate(&[]).is_empty());
    }
}
