//! Vigil: a fixed-rate entity simulation server core.
//!
//! A single tick thread advances a world of live entities through
//! generate, next and commit, then publishes full and delta documents to
//! one view worker per connected session, synchronized on a phase
//! barrier. This facade re-exports the public API of the sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use vigil::prelude::*;
//!
//! let config = SimConfig {
//!     mode: ExecutionMode::Sequential,
//!     scenario: Scenario::reference(3),
//!     ..SimConfig::default()
//! };
//! let mut driver = TickDriver::new(&config).unwrap();
//!
//! let alice = SessionId::from("alice");
//! driver.inbox().submit(alice.clone(), "enter");
//! let report = driver.step();
//!
//! assert_eq!(report.tick, TickId(1));
//! assert_eq!(report.metrics.spawned, 1);
//! // Spawner, three movers and the new avatar.
//! assert_eq!(report.documents.full.len(), 5);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `vigil-core` | Ids, actions, entities, documents, errors |
//! | [`engine`] | `vigil-engine` | Inbox, resolver, barrier, publisher, driver, simulation |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types (`vigil-core`).
///
/// Entities and their per-tick contract ([`types::Entity`]), actions
/// ([`types::Action`], [`types::ActionBatch`]) and serialized documents
/// ([`types::Document`]).
pub use vigil_core as types;

/// Tick execution and view publishing (`vigil-engine`).
///
/// [`engine::TickDriver`] for lockstep stepping, [`engine::Simulation`]
/// for a background tick thread with per-session view workers.
pub use vigil_engine as engine;

/// Common imports for typical Vigil usage.
///
/// ```rust
/// use vigil::prelude::*;
/// ```
pub mod prelude {
    // Ids and actions
    pub use vigil_core::{Action, ActionBatch, EntityId, SessionId, TickId};

    // World
    pub use vigil_core::{Entity, EntityKind, Spawn, StaticEntity, StaticSpawn};

    // Documents
    pub use vigil_core::{Document, EntitySnapshot};

    // Errors
    pub use vigil_core::{BarrierError, EntityError};
    pub use vigil_engine::ConfigError;

    // Engine
    pub use vigil_engine::{
        ExecutionMode, Scenario, SessionRequest, SimConfig, Simulation, TickDocuments, TickDriver,
        TickReport, ViewFilter,
    };
}
