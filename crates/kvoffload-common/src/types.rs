//! Core type definitions for kvoffload
//!
//! This module defines the request model shared by the host and offload
//! paths: logical keys, physical record locations, write commits and
//! host read observations.

use bytes::Bytes;
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque, immutable identifier of a logical record
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Into)]
pub struct Key(Bytes);

impl Key {
    /// Create a key from anything convertible into bytes
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Create a key by copying a byte slice
    #[must_use]
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Get the raw key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the key in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// An empty key cannot identify a record
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&'static str> for Key {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Key {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "{s:?}"),
            _ => {
                f.write_str("0x")?;
                for b in self.0.iter() {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Monotonically comparable write version
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    From,
    Into,
    Display,
)]
#[display("v{_0}")]
pub struct Version(u64);

impl Version {
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Where a durable record resides: `(file_id, offset, size)`
///
/// Immutable once assigned to a given write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalLocation {
    /// Identifier of the data file holding the record
    pub file_id: u64,
    /// Byte offset of the record within the file
    pub offset: u64,
    /// Record size in bytes
    pub size: u32,
}

impl PhysicalLocation {
    #[must_use]
    pub const fn new(file_id: u64, offset: u64, size: u32) -> Self {
        Self {
            file_id,
            offset,
            size,
        }
    }

    /// Exclusive end offset of the record, if it fits in the file address space
    #[must_use]
    pub const fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size as u64)
    }

    /// Check that the location describes a readable record
    pub const fn validate(&self) -> Result<(), LocationError> {
        if self.size == 0 {
            return Err(LocationError::ZeroSize);
        }
        if self.end().is_none() {
            return Err(LocationError::OffsetOverflow {
                offset: self.offset,
                size: self.size,
            });
        }
        Ok(())
    }
}

impl fmt::Display for PhysicalLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file {}@{}+{}", self.file_id, self.offset, self.size)
    }
}

/// Errors describing a structurally invalid physical location
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("record size must be non-zero")]
    ZeroSize,
    #[error("record at offset {offset} with size {size} overflows the file address space")]
    OffsetOverflow { offset: u64, size: u32 },
}

/// Request operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Get,
    Put,
    Delete,
    /// Any op code this layer does not understand; always host-bound
    Other(u16),
}

impl OpType {
    /// Whether the operation only reads data
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Get)
    }

    /// Whether the operation may change the value stored for its key
    #[must_use]
    pub const fn may_mutate(self) -> bool {
        !self.is_read()
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Put => f.write_str("PUT"),
            Self::Delete => f.write_str("DELETE"),
            Self::Other(code) => write!(f, "OP({code})"),
        }
    }
}

/// A decoded key-value request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub op: OpType,
    /// Target key; `None` for malformed requests
    pub key: Option<Key>,
    /// Value bytes, PUT only
    pub payload: Option<Bytes>,
}

impl Request {
    #[must_use]
    pub fn get(key: impl Into<Key>) -> Self {
        Self {
            op: OpType::Get,
            key: Some(key.into()),
            payload: None,
        }
    }

    #[must_use]
    pub fn put(key: impl Into<Key>, payload: impl Into<Bytes>) -> Self {
        Self {
            op: OpType::Put,
            key: Some(key.into()),
            payload: Some(payload.into()),
        }
    }

    #[must_use]
    pub fn delete(key: impl Into<Key>) -> Self {
        Self {
            op: OpType::Delete,
            key: Some(key.into()),
            payload: None,
        }
    }

    #[must_use]
    pub fn other(code: u16, key: Option<Key>) -> Self {
        Self {
            op: OpType::Other(code),
            key,
            payload: None,
        }
    }

    /// The key to route on, if the request carries a usable one
    ///
    /// Empty keys are treated the same as missing keys.
    #[must_use]
    pub fn routing_key(&self) -> Option<&Key> {
        self.key.as_ref().filter(|k| !k.is_empty())
    }
}

/// Ordered requests sharing an arrival context
pub type Batch = Vec<Request>;

/// Outcome of a host write that durably committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub key: Key,
    pub location: PhysicalLocation,
    #[serde(default)]
    pub version: Option<Version>,
}

impl WriteResult {
    #[must_use]
    pub fn new(key: impl Into<Key>, location: PhysicalLocation) -> Self {
        Self {
            key: key.into(),
            location,
            version: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(Version::new(version));
        self
    }
}

/// A read the host performed, which may precede a host-side mutation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOp {
    pub keys: BTreeSet<Key>,
}

impl ReadOp {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

/// A physical read handed to the external file service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalReadOp {
    pub file_id: u64,
    pub offset: u64,
    pub size: u32,
}

impl From<PhysicalLocation> for PhysicalReadOp {
    fn from(loc: PhysicalLocation) -> Self {
        Self {
            file_id: loc.file_id,
            offset: loc.offset,
            size: loc.size,
        }
    }
}

impl fmt::Display for PhysicalReadOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "read file {}@{}+{}", self.file_id, self.offset, self.size)
    }
}
