//! kvoffload Router - request routing between the host and offload paths
//!
//! This crate implements the coherence layer that lets a fast offload path
//! serve reads from physical record locations:
//! - Location cache (sharded, lazily expiring key to location hints)
//! - Classification of request batches into host and offload partitions
//! - Execution-time translation of offload GETs into physical reads
//! - Cache-on-write population from committed host writes
//! - Invalidate-on-read eviction from observed host reads
//!
//! Durable storage, request framing and the file service that performs the
//! physical reads all live outside this crate.

pub mod cache;
pub mod classifier;
pub mod clock;
pub mod events;
pub mod invalidator;
pub mod metrics;
pub mod populator;
pub mod router;
pub mod stats;
pub mod translator;

// Re-exports
pub use cache::{CacheEntry, CacheStats, LocationCache, UpsertCommand, UpsertOutcome};
pub use classifier::{Classification, Classifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventSink, MemorySink, RoutingEvent, Stage, TracingSink};
pub use invalidator::Invalidator;
pub use metrics::PrometheusExporter;
pub use populator::Populator;
pub use router::{CommitReport, Dispatch, OffloadRouter};
pub use stats::{RoutingStats, StatsSnapshot};
pub use translator::{Fallback, Translation, Translator};
