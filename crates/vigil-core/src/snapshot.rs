//! Serialized entity snapshots and the documents published each tick.
//!
//! An [`EntitySnapshot`] is a tagged union: serialized as a single-key
//! mapping whose key is the kind tag and whose value carries the base
//! fields (`id`, `x`, `y`, `name`, `destroyed`) plus the kind's own
//! fields. A [`Document`] maps a stringified positional index (`"0"`,
//! `"1"`, ...) to snapshots, in iteration order.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::error;

use crate::id::{EntityId, SessionId};

/// Fields every snapshot carries regardless of kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BaseFields {
    /// Entity identity.
    pub id: EntityId,
    /// Horizontal position.
    pub x: i32,
    /// Vertical position.
    pub y: i32,
    /// Display name.
    pub name: String,
    /// Whether the entity was destroyed this tick (last appearance).
    pub destroyed: bool,
}

/// Serialized form of one live or static entity.
///
/// ```
/// use vigil_core::snapshot::{BaseFields, EntitySnapshot};
/// use vigil_core::EntityId;
///
/// let snap = EntitySnapshot::Mover {
///     base: BaseFields { id: EntityId(1), x: 2, y: 0, name: "m".into(), destroyed: false },
///     forward: false,
/// };
/// let json = serde_json::to_value(&snap).unwrap();
/// assert_eq!(json["Mover"]["x"], 2);
/// assert_eq!(json["Mover"]["forward"], false);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum EntitySnapshot {
    /// An oscillating mover.
    Mover {
        /// Base fields.
        #[serde(flatten)]
        base: BaseFields,
        /// Alternation flag: `true` steps +1 next.
        forward: bool,
    },
    /// A session-controlled avatar.
    Avatar {
        /// Base fields.
        #[serde(flatten)]
        base: BaseFields,
        /// Owning session.
        session: SessionId,
    },
    /// The world entity that spawns avatars.
    Spawner {
        /// Base fields.
        #[serde(flatten)]
        base: BaseFields,
        /// Where new avatars appear (x).
        spawn_x: i32,
        /// Where new avatars appear (y).
        spawn_y: i32,
    },
    /// A static obstacle.
    Obstacle {
        /// Base fields.
        #[serde(flatten)]
        base: BaseFields,
    },
}

impl EntitySnapshot {
    /// The base fields of any variant.
    pub fn base(&self) -> &BaseFields {
        match self {
            Self::Mover { base, .. }
            | Self::Avatar { base, .. }
            | Self::Spawner { base, .. }
            | Self::Obstacle { base } => base,
        }
    }

    /// The discriminator used as the single key when serialized.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Self::Mover { .. } => "Mover",
            Self::Avatar { .. } => "Avatar",
            Self::Spawner { .. } => "Spawner",
            Self::Obstacle { .. } => "Obstacle",
        }
    }
}

/// Positionally indexed collection of snapshots.
///
/// Keys are assigned in insertion order starting at `"0"`; filtering
/// produces a fresh document with its own dense indices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Document {
    entries: IndexMap<String, EntitySnapshot>,
}

impl Document {
    /// An empty document (`{}`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot under the next positional index.
    pub fn push(&mut self, snapshot: EntitySnapshot) {
        let key = self.entries.len().to_string();
        self.entries.insert(key, snapshot);
    }

    /// Snapshot at positional index `index`.
    pub fn get(&self, index: usize) -> Option<&EntitySnapshot> {
        self.entries.get_index(index).map(|(_, s)| s)
    }

    /// Snapshot of entity `id`, if present.
    pub fn find(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entries.values().find(|s| s.base().id == id)
    }

    /// Whether entity `id` appears in this document.
    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.find(id).is_some()
    }

    /// Iterate snapshots in positional order.
    pub fn iter(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.entries.values()
    }

    /// A new document holding the snapshots for which `keep` is true.
    pub fn filtered(&self, mut keep: impl FnMut(&EntitySnapshot) -> bool) -> Document {
        self.iter().filter(|s| keep(s)).cloned().collect()
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the document is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as compact JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            error!(error = %err, "document serialization failed");
            String::from("{}")
        })
    }
}

impl FromIterator<EntitySnapshot> for Document {
    fn from_iter<I: IntoIterator<Item = EntitySnapshot>>(iter: I) -> Self {
        let mut doc = Document::new();
        for snapshot in iter {
            doc.push(snapshot);
        }
        doc
    }
}
