//! Invalidate-on-read
//!
//! Every key the host reads is evicted from the location cache, since the
//! host may mutate it next. Most reads are not followed by a write, so this
//! over-invalidates; the offload path then simply misses and forwards.

use kvoffload_common::{Key, ReadOp};

/// Turns host read observations into eviction directives
#[derive(Debug, Default, Clone, Copy)]
pub struct Invalidator;

impl Invalidator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// The keys to evict: exactly the keys the host read
    #[must_use]
    pub fn invalidate(&self, read: &ReadOp) -> Vec<Key> {
        read.keys.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_returns_read_set() {
        let read = ReadOp::new(["b", "a"]);
        let keys = Invalidator::new().invalidate(&read);
        assert_eq!(keys, vec![Key::from("a"), Key::from("b")]);
    }

    #[test]
    fn test_invalidate_empty_read() {
        assert!(Invalidator.invalidate(&ReadOp::default()).is_empty());
    }
}
