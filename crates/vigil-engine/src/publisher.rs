//! Barrier-synchronized fan-out of per-tick documents to session workers.
//!
//! Each registered session owns a long-lived view worker thread. Every tick
//! the driver stores the freshly built [`TickDocuments`] and then walks
//! two barrier phases with all workers:
//!
//! ```text
//! Driver (tick thread)                 View worker (one per session)
//!     |                                       |
//!     | store docs                            |
//!     |--arrive: state ready----------------->| arrive: state ready
//!     |                                       | read docs, filter, render
//!     |                                       | store SessionView
//!     |<-arrive: render complete--------------| arrive: render complete
//!     | apply join/leave requests             |
//!     | reap destroyed entities               |
//! ```
//!
//! Join and leave requests are queued from any thread and applied only by
//! the driver in [`ViewPublisher::apply_membership`], between ticks. A
//! worker registered there first counts at the following tick.
//!
//! Once every worker has rendered, the tick's documents are pushed to each
//! [`subscribe`](ViewPublisher::subscribe)r, so a transport can wake on
//! "state ready" instead of polling.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, error, info, warn};
use vigil_core::{BarrierError, Document, EntitySnapshot, SessionId, TickId};

use crate::barrier::{PartyId, PhaseBarrier};
use crate::sync::{lock, read, write};

// ── ViewFilter ───────────────────────────────────────────────────

/// Visibility hook applied when rendering a session's document.
///
/// Called from view worker threads, concurrently for different sessions.
pub trait ViewFilter: Send + Sync {
    /// Whether `session` may see `snapshot`.
    fn visible(&self, session: &SessionId, snapshot: &EntitySnapshot) -> bool;
}

/// Every entity is visible to every session.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllVisible;

impl ViewFilter for AllVisible {
    fn visible(&self, _session: &SessionId, _snapshot: &EntitySnapshot) -> bool {
        true
    }
}

// ── Documents and views ──────────────────────────────────────────

/// The documents published for one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickDocuments {
    /// The tick these documents describe. `TickId(0)` before the first tick.
    pub tick: TickId,
    /// Every live entity, destroyed-this-tick included.
    pub full: Document,
    /// Entities whose changed flag is set this tick.
    pub delta: Document,
}

/// A session's rendered view of one tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionView {
    /// The tick that was rendered.
    pub tick: TickId,
    /// JSON of the filtered full document.
    pub document: String,
}

/// Where a session stands with respect to its view worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewRegistration {
    /// A worker is running for the session.
    Registered,
    /// A worker will be created at the next membership step.
    PendingJoin,
    /// The worker will be torn down at the next membership step.
    PendingLeave,
}

/// What one [`ViewPublisher::apply_membership`] call changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MembershipChanges {
    /// Sessions whose worker was started.
    pub joined: Vec<SessionId>,
    /// Sessions whose worker was torn down.
    pub left: Vec<SessionId>,
    /// Joins refused (session limit reached or worker could not start).
    pub rejected: Vec<SessionId>,
}

impl MembershipChanges {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty() && self.rejected.is_empty()
    }
}

enum MembershipRequest {
    Join(SessionId),
    Leave(SessionId),
}

/// State shared between the publisher and its workers.
struct Shared {
    barrier: PhaseBarrier,
    current: RwLock<Arc<TickDocuments>>,
    views: Mutex<HashMap<SessionId, SessionView>>,
    filter: Arc<dyn ViewFilter>,
}

impl Shared {
    fn current(&self) -> Arc<TickDocuments> {
        Arc::clone(&read(&self.current))
    }
}

struct Worker {
    party: PartyId,
    handle: JoinHandle<()>,
}

// ── ViewPublisher ────────────────────────────────────────────────

/// Ticks a subscriber may fall behind before it starts missing them.
pub const SUBSCRIBER_BACKLOG: usize = 64;

/// Owns the view workers and the barrier they share with the driver.
pub struct ViewPublisher {
    shared: Arc<Shared>,
    requests_tx: Sender<MembershipRequest>,
    requests_rx: Receiver<MembershipRequest>,
    registry: Mutex<HashMap<SessionId, ViewRegistration>>,
    workers: Mutex<HashMap<SessionId, Worker>>,
    subscribers: Mutex<Vec<Sender<Arc<TickDocuments>>>>,
    next_party: AtomicU64,
    max_sessions: usize,
}

impl ViewPublisher {
    /// Create a publisher admitting at most `max_sessions` workers.
    pub fn new(filter: Arc<dyn ViewFilter>, max_sessions: usize) -> Self {
        let (requests_tx, requests_rx) = crossbeam_channel::unbounded();
        Self {
            shared: Arc::new(Shared {
                barrier: PhaseBarrier::new(),
                current: RwLock::new(Arc::new(TickDocuments::default())),
                views: Mutex::new(HashMap::new()),
                filter,
            }),
            requests_tx,
            requests_rx,
            registry: Mutex::new(HashMap::new()),
            workers: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            next_party: AtomicU64::new(1),
            max_sessions,
        }
    }

    // ── Session-facing ───────────────────────────────────────────

    /// Queue a worker for `session`. Returns `false` if the session is
    /// already registered or pending join.
    pub fn request_join(&self, session: SessionId) -> bool {
        let mut registry = lock(&self.registry);
        match registry.get(&session) {
            Some(ViewRegistration::Registered | ViewRegistration::PendingJoin) => false,
            Some(ViewRegistration::PendingLeave) | None => {
                registry.insert(session.clone(), ViewRegistration::PendingJoin);
                self.send(MembershipRequest::Join(session));
                true
            }
        }
    }

    /// Queue teardown of `session`'s worker. Returns `false` if the
    /// session is unknown or already pending leave.
    pub fn request_leave(&self, session: SessionId) -> bool {
        let mut registry = lock(&self.registry);
        match registry.get(&session) {
            None | Some(ViewRegistration::PendingLeave) => false,
            Some(ViewRegistration::Registered | ViewRegistration::PendingJoin) => {
                registry.insert(session.clone(), ViewRegistration::PendingLeave);
                self.send(MembershipRequest::Leave(session));
                true
            }
        }
    }

    fn send(&self, request: MembershipRequest) {
        // Both channel ends live in `self`, so the send cannot fail.
        let _ = self.requests_tx.send(request);
    }

    /// Registration status of `session`.
    pub fn registration(&self, session: &SessionId) -> Option<ViewRegistration> {
        lock(&self.registry).get(session).copied()
    }

    /// The latest view rendered for `session`.
    pub fn session_view(&self, session: &SessionId) -> Option<SessionView> {
        lock(&self.shared.views).get(session).cloned()
    }

    /// JSON of the latest view rendered for `session`; `{}` if none.
    pub fn session_document(&self, session: &SessionId) -> String {
        self.session_view(session)
            .map(|v| v.document)
            .unwrap_or_else(|| String::from("{}"))
    }

    /// Documents of the last published tick.
    pub fn current(&self) -> Arc<TickDocuments> {
        self.shared.current()
    }

    /// Number of running view workers.
    pub fn active_sessions(&self) -> usize {
        lock(&self.workers).len()
    }

    /// Receive the documents of every tick published from now on, after
    /// all view workers have rendered it.
    ///
    /// A subscriber more than [`SUBSCRIBER_BACKLOG`] ticks behind misses
    /// ticks until it drains; [`current`](Self::current) always has the
    /// latest. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<Arc<TickDocuments>> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_BACKLOG);
        lock(&self.subscribers).push(tx);
        rx
    }

    /// The barrier shared with the workers.
    pub fn barrier(&self) -> &PhaseBarrier {
        &self.shared.barrier
    }

    // ── Driver-facing ────────────────────────────────────────────

    /// Publish `docs` and block until every registered worker has
    /// rendered them.
    pub fn publish(&self, docs: Arc<TickDocuments>) -> Result<(), BarrierError> {
        *write(&self.shared.current) = Arc::clone(&docs);
        // Phase 1: state ready.
        self.shared.barrier.arrive_and_await(PartyId::DRIVER)?;
        // Phase 2: render complete.
        self.shared.barrier.arrive_and_await(PartyId::DRIVER)?;
        self.notify(&docs);
        Ok(())
    }

    fn notify(&self, docs: &Arc<TickDocuments>) {
        lock(&self.subscribers).retain(|tx| match tx.try_send(Arc::clone(docs)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(tick = %docs.tick, "subscriber lagging, tick skipped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Apply every queued join and leave request, in submission order.
    ///
    /// Must only be called by the driver, between ticks.
    pub fn apply_membership(&self) -> MembershipChanges {
        let mut changes = MembershipChanges::default();
        while let Ok(request) = self.requests_rx.try_recv() {
            match request {
                MembershipRequest::Join(session) => self.start_worker(session, &mut changes),
                MembershipRequest::Leave(session) => self.stop_worker(session, &mut changes),
            }
        }
        changes
    }

    fn start_worker(&self, session: SessionId, changes: &mut MembershipChanges) {
        let mut workers = lock(&self.workers);
        if workers.contains_key(&session) {
            debug!(session = %session, "join for a session that already has a worker");
            self.settle(&session, ViewRegistration::PendingJoin, Some(ViewRegistration::Registered));
            return;
        }
        if workers.len() >= self.max_sessions {
            warn!(session = %session, max_sessions = self.max_sessions, "session limit reached, join rejected");
            self.settle(&session, ViewRegistration::PendingJoin, None);
            changes.rejected.push(session);
            return;
        }

        let party = PartyId(self.next_party.fetch_add(1, Ordering::Relaxed));
        if let Err(err) = self.shared.barrier.register(party) {
            warn!(session = %session, error = %err, "barrier registration failed");
            self.settle(&session, ViewRegistration::PendingJoin, None);
            changes.rejected.push(session);
            return;
        }

        let shared = Arc::clone(&self.shared);
        let worker_session = session.clone();
        let spawned = thread::Builder::new()
            .name(format!("vigil-view-{session}"))
            .spawn(move || view_worker_loop(shared, worker_session, party));
        match spawned {
            Ok(handle) => {
                workers.insert(session.clone(), Worker { party, handle });
                self.settle(&session, ViewRegistration::PendingJoin, Some(ViewRegistration::Registered));
                info!(session = %session, %party, "view worker started");
                changes.joined.push(session);
            }
            Err(err) => {
                let _ = self.shared.barrier.deregister(party);
                warn!(session = %session, error = %err, "failed to spawn view worker");
                self.settle(&session, ViewRegistration::PendingJoin, None);
                changes.rejected.push(session);
            }
        }
    }

    fn stop_worker(&self, session: SessionId, changes: &mut MembershipChanges) {
        let worker = lock(&self.workers).remove(&session);
        let Some(worker) = worker else {
            debug!(session = %session, "leave for a session without a worker");
            self.settle(&session, ViewRegistration::PendingLeave, None);
            return;
        };
        if let Err(err) = self.shared.barrier.deregister(worker.party) {
            // The worker already exited on its own.
            debug!(session = %session, error = %err, "worker party was not registered");
        }
        if worker.handle.join().is_err() {
            error!(session = %session, "view worker panicked");
        }
        lock(&self.shared.views).remove(&session);
        self.settle(&session, ViewRegistration::PendingLeave, None);
        info!(session = %session, "view worker stopped");
        changes.left.push(session);
    }

    /// Move `session` out of `from` once its request has been applied.
    /// A later request that changed the status is left in place.
    fn settle(&self, session: &SessionId, from: ViewRegistration, to: Option<ViewRegistration>) {
        let mut registry = lock(&self.registry);
        if registry.get(session) != Some(&from) {
            return;
        }
        match to {
            Some(status) => {
                registry.insert(session.clone(), status);
            }
            None => {
                registry.remove(session);
            }
        }
    }

    /// Terminate the barrier and join every worker. Returns the number of
    /// workers that exited cleanly.
    pub fn shutdown(&self) -> usize {
        self.shared.barrier.terminate();
        let workers: Vec<(SessionId, Worker)> = lock(&self.workers).drain().collect();
        let mut joined = 0;
        for (session, worker) in workers {
            match worker.handle.join() {
                Ok(()) => joined += 1,
                Err(_) => error!(session = %session, "view worker panicked"),
            }
        }
        lock(&self.registry).clear();
        joined
    }
}

// ── Worker loop ──────────────────────────────────────────────────

fn view_worker_loop(shared: Arc<Shared>, session: SessionId, party: PartyId) {
    loop {
        if let Err(err) = shared.barrier.arrive_and_await(party) {
            log_worker_exit(&session, &err);
            return;
        }

        let docs = shared.current();
        let rendered = catch_unwind(AssertUnwindSafe(|| {
            render(shared.filter.as_ref(), &session, &docs.full)
        }));
        match rendered {
            Ok(document) => {
                lock(&shared.views).insert(
                    session.clone(),
                    SessionView {
                        tick: docs.tick,
                        document,
                    },
                );
            }
            Err(_) => {
                error!(session = %session, tick = %docs.tick, "render panicked, keeping previous view");
            }
        }

        if let Err(err) = shared.barrier.arrive_and_await(party) {
            log_worker_exit(&session, &err);
            return;
        }
    }
}

fn render(filter: &dyn ViewFilter, session: &SessionId, full: &Document) -> String {
    full.filtered(|snapshot| filter.visible(session, snapshot))
        .to_json()
}

fn log_worker_exit(session: &SessionId, err: &BarrierError) {
    match err {
        // Normal teardown: shutdown, or removed at a membership step.
        BarrierError::Terminated
        | BarrierError::Deregistered { .. }
        | BarrierError::UnknownParty { .. } => {
            debug!(session = %session, reason = %err, "view worker exiting");
        }
        BarrierError::AlreadyRegistered { .. } => {
            warn!(session = %session, error = %err, "view worker exiting on barrier error");
        }
    }
}
