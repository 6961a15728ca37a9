//! Configuration types for kvoffload
//!
//! This module defines the configuration surface of the routing layer:
//! cache entry lifetime, version conflict handling, and how requests
//! inside one batch relate to each other.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lifetime of a cached location (10 seconds)
pub const DEFAULT_TTL_MS: u64 = 10_000;

/// Root configuration for kvoffload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Location cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Request routing configuration
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl Config {
    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()
    }
}

/// Location cache configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of an entry installed on write commit (milliseconds)
    pub ttl_ms: u64,
    /// Drop incoming entries whose version is older than the stored one
    pub versioning: bool,
    /// Shard count of the underlying table; must be a power of two > 1
    pub shards: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            versioning: true,
            shards: None,
        }
    }
}

impl CacheConfig {
    /// Entry lifetime as a duration
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl_ms == 0 {
            return Err(Error::configuration("cache.ttl_ms must be greater than zero"));
        }
        if let Some(shards) = self.shards {
            if shards < 2 || !shards.is_power_of_two() {
                return Err(Error::configuration(format!(
                    "cache.shards must be a power of two greater than one, got {shards}"
                )));
            }
        }
        Ok(())
    }
}

/// Request routing configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Relationship between writes and reads of the same key in one batch
    pub intra_batch: IntraBatchOrdering,
}

/// How a GET relates to an earlier same-key write inside the same batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntraBatchOrdering {
    /// Requests in a batch arrived concurrently; only cache state counts
    #[default]
    Concurrent,
    /// A GET following a PUT, DELETE or unknown op on the same key goes to the host
    WritesShadowReads,
}
