//! Strongly-typed identifiers.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Identifies an entity (live or static) for its whole lifetime.
///
/// Assigned once by an [`IdAllocator`] and never reused, even after the
/// entity is destroyed and reaped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Monotonic source of [`EntityId`]s.
///
/// Owned by the tick driver; live and static entities draw from the same
/// allocator so no id is ever shared between them.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    /// Create an allocator whose first id is `EntityId(1)`.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Hand out the next unused id.
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque identity of a connected client session.
///
/// Assigned by the transport layer; the engine only compares and hashes
/// it. Cloning is cheap (shared string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Wrap a transport-assigned session identifier.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

impl From<String> for SessionId {
    fn from(v: String) -> Self {
        Self(Arc::from(v))
    }
}

/// Monotonically increasing tick counter.
///
/// `TickId(0)` (the default) means "nothing executed yet"; the first
/// executed tick is 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TickId(pub u64);

impl TickId {
    /// The tick after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TickId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
