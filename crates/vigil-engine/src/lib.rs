//! Simulation engine for Vigil.
//!
//! Advances a shared world once per tick and fans a per-session view of
//! every committed tick out to long-lived view workers, synchronized so
//! that each observer sees exactly one consistent snapshot per tick.
//!
//! Two ways to drive it:
//!
//! - [`TickDriver`](driver::TickDriver): one synchronous
//!   [`step()`](driver::TickDriver::step) per call, no tick thread.
//! - [`Simulation`](simulation::Simulation): a background tick thread paced
//!   at `tick_rate_hz` with a start/shutdown lifecycle.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod barrier;
pub mod clock;
pub mod config;
pub mod driver;
pub mod inbox;
pub mod metrics;
pub mod publisher;
pub mod resolver;
pub mod simulation;
mod sync;
mod tick_thread;

pub use barrier::{PartyId, PhaseBarrier};
pub use clock::TickClock;
pub use config::{ConfigError, ExecutionMode, Scenario, SimConfig};
pub use driver::{TickDriver, TickReport};
pub use inbox::{ActionInbox, MergeOutcome};
pub use metrics::TickMetrics;
pub use publisher::{
    AllVisible, MembershipChanges, SessionView, TickDocuments, ViewFilter, ViewPublisher,
    ViewRegistration, SUBSCRIBER_BACKLOG,
};
pub use resolver::{ResolveOutcome, StateResolver};
pub use simulation::{SessionRequest, ShutdownReport, Simulation, SimulationState};
