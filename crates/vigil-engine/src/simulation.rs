//! User-facing `Simulation` API and lifecycle state machine.
//!
//! The tick driver runs on a dedicated background thread at
//! `tick_rate_hz`, while one view worker per registered session renders
//! every published tick.
//!
//! # Architecture
//!
//! ```text
//! Transport thread(s)           Tick thread ("vigil-tick")     View workers
//!     |                               |                             |
//!     |--submit_action()-->[inbox]    | clock.wait_for_next()       |
//!     |--register_session()-->[queue] | inbox.drain()               |
//!     |                               | generate/next/commit        |
//!     |                               | publish --barrier---------->| render
//!     |                               |        <-barrier------------|
//!     |                               | apply join/leave            |
//!     |                               | reap destroyed              |
//!     |<--session_document()----------------------------------------|
//! ```
//!
//! # Lifecycle
//!
//! `Idle → Initializing → Running → ShuttingDown → Stopped`. Sessions may
//! register and submit actions while `Idle`; nothing is consumed until the
//! first tick. A stopped simulation cannot be restarted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{error, info};
use vigil_core::{Action, Document, SessionId, TickId, ACTION_ENTER, ACTION_LEAVE};

use crate::clock::TickClock;
use crate::config::{ConfigError, SimConfig};
use crate::driver::TickDriver;
use crate::inbox::{ActionInbox, MergeOutcome};
use crate::metrics::TickMetrics;
use crate::publisher::{TickDocuments, ViewPublisher, ViewRegistration};
use crate::tick_thread::{Progress, TickThreadState};

// ── SimulationState ──────────────────────────────────────────────

/// Lifecycle state of a [`Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationState {
    /// Constructed; no tick thread yet.
    Idle,
    /// Building the initial world.
    Initializing,
    /// The tick thread is running.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
    /// All threads joined. Terminal.
    Stopped,
}

// ── ShutdownReport ───────────────────────────────────────────────

/// Report from [`Simulation::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Time spent waiting for the tick thread to finish its tick in flight
    /// and stop.
    pub drain_ms: u64,
    /// Whether the tick thread was joined successfully.
    pub tick_joined: bool,
    /// Number of view worker threads joined.
    pub workers_joined: usize,
    /// Last tick executed.
    pub final_tick: TickId,
}

// ── SessionRequest ───────────────────────────────────────────────

/// What [`Simulation::connect`] or [`Simulation::disconnect`] queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRequest {
    /// Whether the view registration change was queued. `false` for a
    /// duplicate connect or a disconnect of an unknown session.
    pub view_queued: bool,
    /// How the `enter` or `leave` action merged into the inbox.
    pub action: MergeOutcome,
}

// ── Simulation ───────────────────────────────────────────────────

/// A running (or runnable) simulation.
///
/// ```no_run
/// use vigil_engine::{Scenario, SimConfig, Simulation};
/// use vigil_core::SessionId;
///
/// let config = SimConfig { scenario: Scenario::reference(10), ..SimConfig::default() };
/// let mut sim = Simulation::new(config).unwrap();
/// sim.start().unwrap();
/// sim.connect(SessionId::from("alice"));
/// sim.submit_action(SessionId::from("alice"), r#"{"name":"right"}"#);
/// println!("{}", sim.session_document(&SessionId::from("alice")));
/// let report = sim.shutdown();
/// assert!(report.tick_joined);
/// ```
pub struct Simulation {
    config: SimConfig,
    state: SimulationState,
    inbox: Arc<ActionInbox>,
    publisher: Arc<ViewPublisher>,
    progress: Arc<Progress>,
    static_document: Document,
    shutdown_flag: Arc<AtomicBool>,
    tick_stopped: Arc<AtomicBool>,
    tick_thread: Option<JoinHandle<TickDriver>>,
}

impl Simulation {
    /// Validate `config` and create an idle simulation.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let publisher = Arc::new(ViewPublisher::new(
            Arc::clone(&config.filter),
            config.max_sessions,
        ));
        Ok(Self {
            config,
            state: SimulationState::Idle,
            inbox: Arc::new(ActionInbox::new()),
            publisher,
            progress: Arc::new(Progress::default()),
            static_document: Document::new(),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            tick_stopped: Arc::new(AtomicBool::new(false)),
            tick_thread: None,
        })
    }

    /// Build the initial world and spawn the tick thread.
    pub fn start(&mut self) -> Result<(), ConfigError> {
        match self.state {
            SimulationState::Idle => {}
            SimulationState::Initializing | SimulationState::Running => {
                return Err(ConfigError::AlreadyStarted)
            }
            SimulationState::ShuttingDown | SimulationState::Stopped => {
                return Err(ConfigError::AlreadyStopped)
            }
        }

        self.state = SimulationState::Initializing;
        let driver = TickDriver::with_channels(
            &self.config,
            Arc::clone(&self.inbox),
            Arc::clone(&self.publisher),
        );
        self.static_document = driver.static_document().clone();

        let state = TickThreadState::new(
            driver,
            TickClock::new(self.config.tick_interval()),
            Arc::clone(&self.progress),
            Arc::clone(&self.shutdown_flag),
            Arc::clone(&self.tick_stopped),
        );
        let spawned = thread::Builder::new()
            .name("vigil-tick".into())
            .spawn(move || state.run());
        match spawned {
            Ok(handle) => self.tick_thread = Some(handle),
            Err(err) => {
                self.state = SimulationState::Idle;
                return Err(ConfigError::ThreadSpawnFailed {
                    reason: format!("tick thread: {err}"),
                });
            }
        }

        self.state = SimulationState::Running;
        info!(
            tick_rate_hz = self.config.tick_rate_hz,
            mode = ?self.config.mode,
            entities = self.config.scenario.spawns.len(),
            "simulation started"
        );
        Ok(())
    }

    /// Stop the tick thread and every view worker.
    ///
    /// 1. **Running → ShuttingDown:** raise the shutdown flag and unpark
    ///    the tick thread out of its clock sleep. A tick in flight finishes,
    ///    publish included: every worker renders it and subscribers are
    ///    notified.
    /// 2. **ShuttingDown → Stopped:** join the tick thread, then terminate
    ///    the barrier and join every view worker.
    ///
    /// Idempotent: a second call returns an empty report.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.state == SimulationState::Stopped {
            return ShutdownReport {
                total_ms: 0,
                drain_ms: 0,
                tick_joined: true,
                workers_joined: 0,
                final_tick: self.progress.tick(),
            };
        }

        let start = Instant::now();
        self.state = SimulationState::ShuttingDown;
        self.shutdown_flag.store(true, Ordering::Release);

        let tick_joined = match self.tick_thread.take() {
            Some(handle) => {
                handle.thread().unpark();
                match handle.join() {
                    Ok(_driver) => true,
                    Err(_) => {
                        error!("tick thread panicked");
                        false
                    }
                }
            }
            None => true,
        };
        let drain_ms = start.elapsed().as_millis() as u64;

        let workers_joined = self.publisher.shutdown();
        self.state = SimulationState::Stopped;

        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            drain_ms,
            tick_joined,
            workers_joined,
            final_tick: self.progress.tick(),
        };
        info!(
            final_tick = %report.final_tick,
            workers_joined,
            total_ms = report.total_ms,
            "simulation stopped"
        );
        report
    }

    // ── Sessions ─────────────────────────────────────────────────

    /// Queue a view worker for `session`, created at the next membership
    /// step. Returns `false` if already registered or pending.
    pub fn register_session(&self, session: SessionId) -> bool {
        self.publisher.request_join(session)
    }

    /// Queue teardown of `session`'s view worker. Returns `false` if the
    /// session is unknown or already leaving.
    pub fn unregister_session(&self, session: SessionId) -> bool {
        self.publisher.request_leave(session)
    }

    /// Buffer a raw action payload for the next tick.
    pub fn submit_action(&self, session: SessionId, payload: &str) -> MergeOutcome {
        self.inbox.submit(session, payload)
    }

    /// Register `session` and submit its `enter` action.
    pub fn connect(&self, session: SessionId) -> SessionRequest {
        SessionRequest {
            view_queued: self.publisher.request_join(session.clone()),
            action: self.inbox.submit_action(Action::new(session, ACTION_ENTER)),
        }
    }

    /// Unregister `session` and submit its `leave` action.
    pub fn disconnect(&self, session: SessionId) -> SessionRequest {
        SessionRequest {
            view_queued: self.publisher.request_leave(session.clone()),
            action: self.inbox.submit_action(Action::new(session, ACTION_LEAVE)),
        }
    }

    /// Registration status of `session`.
    pub fn registration(&self, session: &SessionId) -> Option<ViewRegistration> {
        self.publisher.registration(session)
    }

    // ── Documents ────────────────────────────────────────────────

    /// Documents of the last published tick.
    pub fn latest_documents(&self) -> Arc<TickDocuments> {
        self.publisher.current()
    }

    /// Receive each tick's documents once every view worker has rendered
    /// them. See [`ViewPublisher::subscribe`].
    pub fn subscribe(&self) -> Receiver<Arc<TickDocuments>> {
        self.publisher.subscribe()
    }

    /// JSON of the last published full document; `{}` before the first tick.
    pub fn full_document(&self) -> String {
        self.latest_documents().full.to_json()
    }

    /// JSON of the last published delta document; `{}` before the first tick.
    pub fn delta_document(&self) -> String {
        self.latest_documents().delta.to_json()
    }

    /// JSON of the static document; `{}` before [`start`](Self::start).
    pub fn static_document(&self) -> String {
        self.static_document.to_json()
    }

    /// JSON of `session`'s latest rendered view; `{}` if none.
    pub fn session_document(&self, session: &SessionId) -> String {
        self.publisher.session_document(session)
    }

    // ── Progress ─────────────────────────────────────────────────

    /// Lifecycle state.
    pub fn state(&self) -> SimulationState {
        self.state
    }

    /// Last executed tick. `TickId(0)` before the first.
    pub fn current_tick(&self) -> TickId {
        self.progress.tick()
    }

    /// Metrics from the last executed tick.
    pub fn last_metrics(&self) -> TickMetrics {
        self.progress.metrics()
    }

    /// Whether the tick thread has exited its loop.
    pub fn is_tick_stopped(&self) -> bool {
        self.tick_stopped.load(Ordering::Acquire)
    }

    /// Target tick interval.
    pub fn tick_interval(&self) -> Duration {
        self.config.tick_interval()
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if self.state != SimulationState::Stopped {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionMode, Scenario};
    use crate::publisher::ViewFilter;
    use vigil_core::{EntitySnapshot, StaticSpawn};

    fn config() -> SimConfig {
        SimConfig {
            tick_rate_hz: 500.0,
            mode: ExecutionMode::Sequential,
            scenario: Scenario::reference(4),
            ..SimConfig::default()
        }
    }

    fn wait_for_tick(sim: &Simulation, tick: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while sim.current_tick() < TickId(tick) {
            assert!(Instant::now() < deadline, "simulation made no progress");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = SimConfig {
            tick_rate_hz: f64::NAN,
            ..config()
        };
        assert!(matches!(
            Simulation::new(bad),
            Err(ConfigError::InvalidTickRate { .. })
        ));
    }

    #[test]
    fn lifecycle_transitions() {
        let mut sim = Simulation::new(config()).unwrap();
        assert_eq!(sim.state(), SimulationState::Idle);
        assert_eq!(sim.full_document(), "{}");

        sim.start().unwrap();
        assert_eq!(sim.state(), SimulationState::Running);
        assert_eq!(sim.start(), Err(ConfigError::AlreadyStarted));
        wait_for_tick(&sim, 2);

        let report = sim.shutdown();
        assert!(report.tick_joined);
        assert!(report.final_tick >= TickId(2));
        assert!(sim.is_tick_stopped());
        assert_eq!(sim.state(), SimulationState::Stopped);
        assert_eq!(sim.start(), Err(ConfigError::AlreadyStopped));

        let again = sim.shutdown();
        assert_eq!(again.workers_joined, 0);
    }

    #[test]
    fn shutdown_of_idle_simulation() {
        let mut sim = Simulation::new(config()).unwrap();
        let report = sim.shutdown();
        assert!(report.tick_joined);
        assert_eq!(report.final_tick, TickId(0));
        assert_eq!(sim.state(), SimulationState::Stopped);
    }

    #[test]
    fn connected_session_sees_its_avatar() {
        let mut sim = Simulation::new(config()).unwrap();
        let alice = SessionId::from("alice");
        sim.connect(alice.clone());
        assert_eq!(sim.registration(&alice), Some(ViewRegistration::PendingJoin));
        sim.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let doc: serde_json::Value =
                serde_json::from_str(&sim.session_document(&alice)).unwrap();
            let has_avatar = doc
                .as_object()
                .unwrap()
                .values()
                .any(|v| v["Avatar"]["session"] == "alice");
            if has_avatar {
                break;
            }
            assert!(Instant::now() < deadline, "avatar never rendered");
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(sim.registration(&alice), Some(ViewRegistration::Registered));

        sim.disconnect(alice.clone());
        let deadline = Instant::now() + Duration::from_secs(5);
        while sim.registration(&alice).is_some() {
            assert!(Instant::now() < deadline, "session never left");
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(sim.session_document(&alice), "{}");

        let report = sim.shutdown();
        assert_eq!(report.workers_joined, 0);
    }

    #[test]
    fn static_document_is_available_after_start() {
        let cfg = SimConfig {
            scenario: config()
                .scenario
                .with_static(StaticSpawn::obstacle("rock", 3, 3)),
            ..config()
        };
        let mut sim = Simulation::new(cfg).unwrap();
        assert_eq!(sim.static_document(), "{}");
        sim.start().unwrap();
        let doc: serde_json::Value = serde_json::from_str(&sim.static_document()).unwrap();
        assert_eq!(doc["0"]["Obstacle"]["name"], "rock");
    }

    #[test]
    fn drop_shuts_down() {
        let mut sim = Simulation::new(config()).unwrap();
        sim.register_session(SessionId::from("a"));
        sim.start().unwrap();
        wait_for_tick(&sim, 1);
        drop(sim);
    }

    #[test]
    fn connect_reports_duplicates() {
        let sim = Simulation::new(config()).unwrap();
        let alice = SessionId::from("alice");
        let first = sim.connect(alice.clone());
        assert_eq!(
            first,
            SessionRequest {
                view_queued: true,
                action: MergeOutcome::Inserted,
            }
        );
        let again = sim.connect(alice.clone());
        assert!(!again.view_queued);
        assert_eq!(again.action, MergeOutcome::Discarded);

        let ghost = sim.disconnect(SessionId::from("ghost"));
        assert!(!ghost.view_queued);
        assert_eq!(ghost.action, MergeOutcome::Inserted);
    }

    #[test]
    fn subscribers_receive_consecutive_ticks() {
        let mut sim = Simulation::new(config()).unwrap();
        let rx = sim.subscribe();
        sim.start().unwrap();

        let timeout = Duration::from_secs(5);
        let first = rx.recv_timeout(timeout).unwrap();
        let second = rx.recv_timeout(timeout).unwrap();
        assert_eq!(first.tick, TickId(1));
        assert_eq!(second.tick, first.tick.next());
        assert_eq!(second.full.len(), 5);
        sim.shutdown();
    }

    struct SlowFilter {
        rendering: AtomicBool,
        delay: Duration,
    }

    impl ViewFilter for SlowFilter {
        fn visible(&self, _: &SessionId, _: &EntitySnapshot) -> bool {
            self.rendering.store(true, Ordering::Release);
            thread::sleep(self.delay);
            true
        }
    }

    #[test]
    fn shutdown_lets_the_tick_in_flight_finish_publishing() {
        let filter = Arc::new(SlowFilter {
            rendering: AtomicBool::new(false),
            delay: Duration::from_millis(100),
        });
        let cfg = SimConfig {
            scenario: Scenario::reference(1),
            filter: filter.clone(),
            ..config()
        };
        let mut sim = Simulation::new(cfg).unwrap();
        sim.register_session(SessionId::from("a"));
        let rx = sim.subscribe();
        sim.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !filter.rendering.load(Ordering::Acquire) {
            assert!(Instant::now() < deadline, "worker never rendered");
            thread::sleep(Duration::from_millis(1));
        }
        let report = sim.shutdown();

        // The tick thread waited for the render-complete arrival.
        assert!(report.drain_ms >= 50, "drain took {} ms", report.drain_ms);
        assert_eq!(report.workers_joined, 1);
        let last = rx.try_iter().last().map(|docs| docs.tick);
        assert_eq!(last, Some(report.final_tick));
    }
}
