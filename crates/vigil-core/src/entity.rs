//! Live entities and the per-tick generate / next / commit contract.
//!
//! Every tick the resolver drives each live entity through:
//!
//! 1. [`Entity::generate`]: read-only over the world as it was at tick
//!    start; returns the events the entity records on itself and any
//!    entities it spawns.
//! 2. [`Entity::next`]: pure; computes the replacement value from the
//!    same world view, the drained actions and the entity's own events.
//! 3. [`Entity::commit`]: adopts the replacement.
//! 4. [`Entity::clear_events`].
//!
//! The set of kinds is closed ([`EntityKind`]); dispatch is a `match`.

use smallvec::SmallVec;

use crate::action::{Action, ActionBatch};
use crate::error::EntityError;
use crate::id::{EntityId, SessionId};
use crate::snapshot::{BaseFields, EntitySnapshot};
use crate::static_entity::StaticEntity;

/// Event a mover records when its predicted position coincides with
/// another entity's.
pub const EVENT_COLLIDE: &str = "collide";

/// Action that spawns a session's avatar.
pub const ACTION_ENTER: &str = "enter";

/// Action that destroys a session's avatar.
pub const ACTION_LEAVE: &str = "leave";

/// Name given to spawned avatars.
pub const AVATAR_NAME: &str = "Player";

/// Per-tick event set. Small: most entities record zero or one event.
pub type Events = SmallVec<[String; 2]>;

// ── Kinds ───────────────────────────────────────────────────────

/// Oscillates one cell along x every tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mover {
    /// `true`: the next step is +1; `false`: −1.
    pub forward: bool,
}

/// Entity steered by one session's actions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Avatar {
    /// The controlling session.
    pub session: SessionId,
}

/// The world entity: spawns an avatar for each entering session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Spawner {
    /// Spawn point x.
    pub spawn_x: i32,
    /// Spawn point y.
    pub spawn_y: i32,
}

/// Closed set of entity kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// See [`Mover`].
    Mover(Mover),
    /// See [`Avatar`].
    Avatar(Avatar),
    /// See [`Spawner`].
    Spawner(Spawner),
}

/// An id-less entity produced by a generate phase or a scenario.
///
/// The resolver assigns ids in deterministic order when it appends spawns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spawn {
    /// Display name.
    pub name: String,
    /// Initial x.
    pub x: i32,
    /// Initial y.
    pub y: i32,
    /// Kind and kind-specific state.
    pub kind: EntityKind,
}

impl Spawn {
    /// A mover at `(x, y)`.
    pub fn mover(name: impl Into<String>, x: i32, y: i32, forward: bool) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            kind: EntityKind::Mover(Mover { forward }),
        }
    }

    /// An avatar for `session` at `(x, y)`.
    pub fn avatar(session: SessionId, x: i32, y: i32) -> Self {
        Self {
            name: AVATAR_NAME.to_owned(),
            x,
            y,
            kind: EntityKind::Avatar(Avatar { session }),
        }
    }

    /// A spawner whose avatars appear at `(spawn_x, spawn_y)`.
    pub fn spawner(name: impl Into<String>, spawn_x: i32, spawn_y: i32) -> Self {
        Self {
            name: name.into(),
            x: 0,
            y: 0,
            kind: EntityKind::Spawner(Spawner { spawn_x, spawn_y }),
        }
    }

    /// Give the draft an identity. The new entity is marked changed.
    pub fn instantiate(self, id: EntityId) -> Entity {
        let mut entity = Entity::new(id, self.name, self.x, self.y, self.kind);
        entity.changed = true;
        entity
    }
}

/// Result of [`Entity::generate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerateOutcome {
    /// Events to record on the generating entity.
    pub events: Events,
    /// New entities to append after every existing entity.
    pub spawns: Vec<Spawn>,
}

// ── Entity ──────────────────────────────────────────────────────

/// A unit of simulated state.
///
/// The id is fixed at construction; every other field is replaced
/// wholesale by [`commit`](Self::commit).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    id: EntityId,
    name: String,
    x: i32,
    y: i32,
    destroyed: bool,
    changed: bool,
    events: Events,
    kind: EntityKind,
}

impl Entity {
    /// Construct an entity with no events, not destroyed, not changed.
    pub fn new(id: EntityId, name: impl Into<String>, x: i32, y: i32, kind: EntityKind) -> Self {
        Self {
            id,
            name: name.into(),
            x,
            y,
            destroyed: false,
            changed: false,
            events: Events::new(),
            kind,
        }
    }

    /// Identity.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current position.
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Whether the entity has been flagged for removal.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Whether the last committed value differs from the one before it.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Override the changed flag.
    pub fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    /// Kind and kind-specific state.
    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// The controlling session, for avatars.
    pub fn session(&self) -> Option<&SessionId> {
        match &self.kind {
            EntityKind::Avatar(a) => Some(&a.session),
            _ => None,
        }
    }

    /// Events recorded this tick.
    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Whether `event` was recorded this tick.
    pub fn has_event(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }

    /// Record an event. Recording the same event twice is a no-op.
    pub fn record_event(&mut self, event: impl Into<String>) {
        let event = event.into();
        if !self.has_event(&event) {
            self.events.push(event);
        }
    }

    /// Drop every recorded event.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Where this entity will be after its next phase, as far as other
    /// entities can tell. `None` for entities that do not move or are
    /// about to disappear.
    ///
    /// Collisions are not taken into account: this is the one-step
    /// prediction the collision heuristic compares against.
    pub fn predicted_position(
        &self,
        statics: &[StaticEntity],
        actions: &ActionBatch,
    ) -> Option<(i32, i32)> {
        if self.destroyed {
            return None;
        }
        match &self.kind {
            EntityKind::Mover(m) => Some((self.x.saturating_add(step(m.forward)), self.y)),
            EntityKind::Avatar(a) => self.avatar_target(a, statics, actions).ok().flatten(),
            EntityKind::Spawner(_) => None,
        }
    }

    /// Generate phase.
    ///
    /// `live` is the live collection as it was at tick start (this entity
    /// included). Must not observe anything generated this tick.
    pub fn generate(
        &self,
        live: &[Entity],
        statics: &[StaticEntity],
        actions: &ActionBatch,
    ) -> Result<GenerateOutcome, EntityError> {
        let mut outcome = GenerateOutcome::default();
        match &self.kind {
            EntityKind::Mover(_) => {
                let Some(mine) = self.predicted_position(statics, actions) else {
                    return Ok(outcome);
                };
                let collides = live
                    .iter()
                    .filter(|other| other.id != self.id)
                    .any(|other| other.predicted_position(statics, actions) == Some(mine));
                if collides {
                    outcome.events.push(EVENT_COLLIDE.to_owned());
                }
            }
            EntityKind::Avatar(_) => {}
            EntityKind::Spawner(spawner) => {
                for session in actions.sessions_with(ACTION_ENTER) {
                    let present = live
                        .iter()
                        .any(|e| !e.destroyed && e.session() == Some(session));
                    if !present {
                        outcome.spawns.push(Spawn::avatar(
                            session.clone(),
                            spawner.spawn_x,
                            spawner.spawn_y,
                        ));
                    }
                }
            }
        }
        Ok(outcome)
    }

    /// Next phase: the value this entity will hold after commit.
    ///
    /// Pure: depends only on `self` (events included), `statics` and
    /// `actions`. `live` is the pre-generate collection.
    pub fn next(
        &self,
        _live: &[Entity],
        statics: &[StaticEntity],
        actions: &ActionBatch,
    ) -> Result<Entity, EntityError> {
        let mut replacement = self.clone();
        replacement.events.clear();
        match &self.kind {
            EntityKind::Mover(m) => {
                let mut delta = step(m.forward);
                if self.has_event(EVENT_COLLIDE) {
                    delta = -delta;
                }
                replacement.x = self.x.saturating_add(delta);
                replacement.kind = EntityKind::Mover(Mover {
                    forward: !m.forward,
                });
                replacement.changed = true;
            }
            EntityKind::Avatar(a) => match self.avatar_target(a, statics, actions)? {
                None => {
                    replacement.destroyed = true;
                    replacement.changed = true;
                }
                Some((x, y)) => {
                    replacement.changed = (x, y) != self.position();
                    replacement.x = x;
                    replacement.y = y;
                }
            },
            EntityKind::Spawner(_) => {
                replacement.changed = false;
            }
        }
        Ok(replacement)
    }

    /// Adopt every field of `replacement` except identity and events.
    pub fn commit(&mut self, replacement: Entity) {
        debug_assert_eq!(self.id, replacement.id, "commit across identities");
        self.name = replacement.name;
        self.x = replacement.x;
        self.y = replacement.y;
        self.destroyed = replacement.destroyed;
        self.changed = replacement.changed;
        self.kind = replacement.kind;
    }

    /// Serialized form.
    pub fn snapshot(&self) -> EntitySnapshot {
        let base = BaseFields {
            id: self.id,
            x: self.x,
            y: self.y,
            name: self.name.clone(),
            destroyed: self.destroyed,
        };
        match &self.kind {
            EntityKind::Mover(m) => EntitySnapshot::Mover {
                base,
                forward: m.forward,
            },
            EntityKind::Avatar(a) => EntitySnapshot::Avatar {
                base,
                session: a.session.clone(),
            },
            EntityKind::Spawner(s) => EntitySnapshot::Spawner {
                base,
                spawn_x: s.spawn_x,
                spawn_y: s.spawn_y,
            },
        }
    }

    /// Where the avatar's pending actions take it. `Ok(None)` when the
    /// session is leaving. Moves into a blocked cell keep the avatar put.
    fn avatar_target(
        &self,
        avatar: &Avatar,
        statics: &[StaticEntity],
        actions: &ActionBatch,
    ) -> Result<Option<(i32, i32)>, EntityError> {
        let pending = actions.for_session(&avatar.session);
        if pending.iter().any(|a| a.name == ACTION_LEAVE) {
            return Ok(None);
        }
        let (mut dx, mut dy) = (0i32, 0i32);
        for action in pending {
            match action.name.as_str() {
                "up" => dy = dy.saturating_sub(1),
                "down" => dy = dy.saturating_add(1),
                "left" => dx = dx.saturating_sub(1),
                "right" => dx = dx.saturating_add(1),
                "move" => {
                    dx = dx.saturating_add(self.int_parameter(action, "dx")?);
                    dy = dy.saturating_add(self.int_parameter(action, "dy")?);
                }
                _ => {}
            }
        }
        let target = (self.x.saturating_add(dx), self.y.saturating_add(dy));
        if target != self.position() && statics.iter().any(|s| s.blocks(target)) {
            return Ok(Some(self.position()));
        }
        Ok(Some(target))
    }

    fn int_parameter(&self, action: &Action, name: &str) -> Result<i32, EntityError> {
        match action.parameter(name) {
            None => Ok(0),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| EntityError::InvalidParameter {
                    entity: self.id,
                    action: action.name.clone(),
                    parameter: name.to_owned(),
                    value: raw.to_owned(),
                }),
        }
    }
}

fn step(forward: bool) -> i32 {
    if forward {
        1
    } else {
        -1
    }
}
