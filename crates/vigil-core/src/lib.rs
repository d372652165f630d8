//! Core types for the Vigil simulation engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the identifiers, client actions, the closed set of entity kinds with
//! their generate/next/serialize contract, the document shapes published
//! every tick, and the error types shared across the workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod action;
pub mod entity;
pub mod error;
pub mod id;
pub mod snapshot;
pub mod static_entity;

pub use action::{Action, ActionBatch};
pub use entity::{
    Avatar, Entity, EntityKind, Events, GenerateOutcome, Mover, Spawn, Spawner, ACTION_ENTER,
    ACTION_LEAVE, AVATAR_NAME, EVENT_COLLIDE,
};
pub use error::{BarrierError, EntityError};
pub use id::{EntityId, IdAllocator, SessionId, TickId};
pub use snapshot::{BaseFields, Document, EntitySnapshot};
pub use static_entity::{StaticEntity, StaticKind, StaticSpawn};
