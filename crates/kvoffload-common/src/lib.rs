//! kvoffload Common - Shared types and utilities
//!
//! This crate provides the request/location data model, error definitions,
//! and configuration types used across all kvoffload components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{CacheConfig, Config, IntraBatchOrdering, RoutingConfig};
pub use error::{Error, Result};
pub use types::*;
