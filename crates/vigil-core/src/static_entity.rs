//! Immutable entity-like records computed once at initialization.

use crate::id::{EntityId, IdAllocator};
use crate::snapshot::{BaseFields, EntitySnapshot};

/// Kinds of static entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaticKind {
    /// Blocks avatar movement into its cell.
    Obstacle,
}

/// Id-less description of a static entity, used in scenarios.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticSpawn {
    /// Display name.
    pub name: String,
    /// Horizontal position.
    pub x: i32,
    /// Vertical position.
    pub y: i32,
    /// What the static entity is.
    pub kind: StaticKind,
}

impl StaticSpawn {
    /// Describe an obstacle at `(x, y)`.
    pub fn obstacle(name: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            kind: StaticKind::Obstacle,
        }
    }

    /// Give the description an identity.
    pub fn instantiate(self, ids: &mut IdAllocator) -> StaticEntity {
        StaticEntity {
            id: ids.allocate(),
            name: self.name,
            x: self.x,
            y: self.y,
            kind: self.kind,
        }
    }
}

/// A static entity. Never mutated after initialization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticEntity {
    id: EntityId,
    name: String,
    x: i32,
    y: i32,
    kind: StaticKind,
}

impl StaticEntity {
    /// Identity.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position.
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Kind.
    pub fn kind(&self) -> StaticKind {
        self.kind
    }

    /// Whether the entity blocks movement into its cell.
    pub fn blocks(&self, position: (i32, i32)) -> bool {
        match self.kind {
            StaticKind::Obstacle => self.position() == position,
        }
    }

    /// Serialized form, same shape as live entities.
    pub fn serialize(&self) -> EntitySnapshot {
        let base = BaseFields {
            id: self.id,
            x: self.x,
            y: self.y,
            name: self.name.clone(),
            destroyed: false,
        };
        match self.kind {
            StaticKind::Obstacle => EntitySnapshot::Obstacle { base },
        }
    }
}
