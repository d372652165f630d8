//! Synchronous tick execution.
//!
//! [`TickDriver`] owns the live and static collections and runs one full
//! tick per [`step()`](TickDriver::step), with no pacing and no tick
//! thread of its own:
//!
//! 1. drain the action inbox;
//! 2. generate, append spawns, next, commit, clear events;
//! 3. build the full and delta documents;
//! 4. publish and wait for every view worker;
//! 5. apply queued session joins and leaves;
//! 6. reap destroyed entities.
//!
//! The background tick thread of a [`Simulation`](crate::simulation::Simulation)
//! wraps a driver with a [`TickClock`](crate::clock::TickClock). Tests call
//! `step()` directly for deterministic, lockstep execution.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};
use vigil_core::{
    BarrierError, Document, Entity, EntityError, IdAllocator, StaticEntity, TickId,
};

use crate::config::{ConfigError, SimConfig};
use crate::inbox::ActionInbox;
use crate::metrics::TickMetrics;
use crate::publisher::{MembershipChanges, TickDocuments, ViewPublisher};
use crate::resolver::StateResolver;

// ── TickReport ───────────────────────────────────────────────────

/// Result of one [`TickDriver::step()`].
#[derive(Debug)]
pub struct TickReport {
    /// The tick that was executed.
    pub tick: TickId,
    /// The documents published for this tick.
    pub documents: Arc<TickDocuments>,
    /// Whether every view worker rendered the tick. `false` only when the
    /// barrier was terminated mid-publish (shutdown).
    pub published: bool,
    /// Per-entity failures.
    pub failures: Vec<EntityError>,
    /// Session membership applied after publish.
    pub membership: MembershipChanges,
    /// Timing and population for this tick.
    pub metrics: TickMetrics,
}

// ── TickDriver ───────────────────────────────────────────────────

/// Owns the world and executes ticks synchronously.
pub struct TickDriver {
    live: Vec<Entity>,
    statics: Vec<StaticEntity>,
    static_document: Document,
    ids: IdAllocator,
    resolver: StateResolver,
    inbox: Arc<ActionInbox>,
    publisher: Arc<ViewPublisher>,
    tick: TickId,
    last_metrics: TickMetrics,
}

impl TickDriver {
    /// Build the initial world from `config` with a fresh inbox and
    /// publisher.
    pub fn new(config: &SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let inbox = Arc::new(ActionInbox::new());
        let publisher = Arc::new(ViewPublisher::new(
            Arc::clone(&config.filter),
            config.max_sessions,
        ));
        Ok(Self::with_channels(config, inbox, publisher))
    }

    /// Build the initial world from `config`, sharing an existing inbox and
    /// publisher.
    ///
    /// Live entities are instantiated first, then statics; the static
    /// document is serialized here, once.
    pub fn with_channels(
        config: &SimConfig,
        inbox: Arc<ActionInbox>,
        publisher: Arc<ViewPublisher>,
    ) -> Self {
        let mut ids = IdAllocator::new();
        let live: Vec<Entity> = config
            .scenario
            .spawns
            .iter()
            .cloned()
            .map(|spawn| {
                let mut entity = spawn.instantiate(ids.allocate());
                entity.set_changed(false);
                entity
            })
            .collect();
        let statics: Vec<StaticEntity> = config
            .scenario
            .statics
            .iter()
            .cloned()
            .map(|spawn| spawn.instantiate(&mut ids))
            .collect();
        let static_document = statics.iter().map(StaticEntity::serialize).collect();
        debug!(
            live = live.len(),
            statics = statics.len(),
            "world initialized"
        );
        Self {
            live,
            statics,
            static_document,
            ids,
            resolver: StateResolver::new(config.mode),
            inbox,
            publisher,
            tick: TickId(0),
            last_metrics: TickMetrics::default(),
        }
    }

    /// Execute one tick.
    pub fn step(&mut self) -> TickReport {
        let tick_start = Instant::now();
        let tick = self.tick.next();
        let mut metrics = TickMetrics::default();

        // 1. Drain.
        let t = Instant::now();
        let actions = self.inbox.drain();
        metrics.drain_us = t.elapsed().as_micros() as u64;
        metrics.actions = actions.len();

        // 2. Generate / next / commit.
        let outcome = self
            .resolver
            .resolve(&mut self.live, &self.statics, &actions, &mut self.ids);
        metrics.generate_us = outcome.generate_us;
        metrics.next_us = outcome.next_us;
        metrics.commit_us = outcome.commit_us;
        metrics.spawned = outcome.spawned;
        metrics.entity_failures = outcome.failures.len();

        // 3, 4. Documents and publish.
        let t = Instant::now();
        let documents = Arc::new(self.build_documents(tick));
        let published = match self.publisher.publish(Arc::clone(&documents)) {
            Ok(()) => true,
            Err(BarrierError::Terminated) => {
                debug!(%tick, "publish interrupted by shutdown");
                false
            }
            Err(err) => {
                warn!(%tick, error = %err, "publish failed");
                false
            }
        };
        metrics.publish_us = t.elapsed().as_micros() as u64;

        // 5. Session joins and leaves.
        let membership = self.publisher.apply_membership();

        // 6. Reap.
        let before = self.live.len();
        self.live.retain(|e| !e.is_destroyed());
        metrics.reaped = before - self.live.len();

        metrics.live_entities = self.live.len();
        metrics.sessions = self.publisher.active_sessions();
        metrics.total_us = tick_start.elapsed().as_micros() as u64;

        self.tick = tick;
        self.last_metrics = metrics.clone();
        debug!(
            %tick,
            actions = metrics.actions,
            spawned = metrics.spawned,
            reaped = metrics.reaped,
            failures = metrics.entity_failures,
            total_us = metrics.total_us,
            "tick complete"
        );

        TickReport {
            tick,
            documents,
            published,
            failures: outcome.failures,
            membership,
            metrics,
        }
    }

    fn build_documents(&self, tick: TickId) -> TickDocuments {
        let mut full = Document::new();
        let mut delta = Document::new();
        for entity in &self.live {
            let snapshot = entity.snapshot();
            if entity.is_changed() {
                delta.push(snapshot.clone());
            }
            full.push(snapshot);
        }
        TickDocuments { tick, full, delta }
    }

    /// The live collection.
    pub fn live(&self) -> &[Entity] {
        &self.live
    }

    /// The static collection.
    pub fn statics(&self) -> &[StaticEntity] {
        &self.statics
    }

    /// The static document, built once at initialization.
    pub fn static_document(&self) -> &Document {
        &self.static_document
    }

    /// The most recently executed tick. `TickId(0)` before the first.
    pub fn current_tick(&self) -> TickId {
        self.tick
    }

    /// Metrics from the most recent tick.
    pub fn last_metrics(&self) -> &TickMetrics {
        &self.last_metrics
    }

    /// The inbox this driver drains.
    pub fn inbox(&self) -> &Arc<ActionInbox> {
        &self.inbox
    }

    /// The publisher this driver publishes through.
    pub fn publisher(&self) -> &Arc<ViewPublisher> {
        &self.publisher
    }
}
