//! Diagnosable routing events
//!
//! Fallbacks, dropped writes and rejected entries are reported here as
//! values on a side channel. Recording an event never changes how a request
//! is routed.

use kvoffload_common::{Key, OpType, Version};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, warn};

/// Which stage observed a malformed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Translate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classify => f.write_str("classify"),
            Self::Translate => f.write_str("translate"),
        }
    }
}

/// Something worth diagnosing that did not fail a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingEvent {
    /// Request without a usable key; forwarded to the host
    MissingKey { op: OpType, stage: Stage },
    /// Entry present at classification was gone at translation
    TranslateMiss { key: Key },
    /// A non-read request reached the translator
    NotOffloadable { op: OpType, key: Key },
    /// Out-of-order write; the newer stored entry was kept
    StaleWriteDropped {
        key: Key,
        retained: Version,
        incoming: Version,
    },
    /// Structurally invalid entry refused by the cache
    InvalidEntryRejected { key: Key, reason: String },
    /// Live entry dropped after a host read
    Evicted { key: Key },
}

impl fmt::Display for RoutingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey { op, stage } => write!(f, "{op} without key at {stage}"),
            Self::TranslateMiss { key } => write!(f, "location for {key} gone before translation"),
            Self::NotOffloadable { op, key } => write!(f, "{op} {key} cannot be offloaded"),
            Self::StaleWriteDropped {
                key,
                retained,
                incoming,
            } => write!(f, "dropped {incoming} of {key}, keeping {retained}"),
            Self::InvalidEntryRejected { key, reason } => {
                write!(f, "rejected location for {key}: {reason}")
            }
            Self::Evicted { key } => write!(f, "evicted {key} after host read"),
        }
    }
}

/// Receiver of routing events
pub trait EventSink: Send + Sync {
    fn record(&self, event: RoutingEvent);
}

/// Sink that logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: RoutingEvent) {
        match &event {
            RoutingEvent::MissingKey { .. }
            | RoutingEvent::NotOffloadable { .. }
            | RoutingEvent::InvalidEntryRejected { .. } => warn!(event = %event, "routing anomaly"),
            RoutingEvent::TranslateMiss { .. }
            | RoutingEvent::StaleWriteDropped { .. }
            | RoutingEvent::Evicted { .. } => debug!(event = %event, "routing event"),
        }
    }
}

/// Sink keeping the most recent events in memory
#[derive(Debug)]
pub struct MemorySink {
    events: Mutex<VecDeque<RoutingEvent>>,
    capacity: usize,
}

impl MemorySink {
    /// Keep at most `capacity` events, dropping the oldest first
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Copy of the retained events, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<RoutingEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Remove and return the retained events
    pub fn drain(&self) -> Vec<RoutingEvent> {
        self.events.lock().drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: RoutingEvent) {
        if self.capacity == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}
