//! Simulation configuration, validation, and error types.
//!
//! [`SimConfig`] is the input for constructing a
//! [`Simulation`](crate::simulation::Simulation) or a
//! [`TickDriver`](crate::driver::TickDriver).
//! [`validate()`](SimConfig::validate) checks structural invariants before
//! any thread is spawned.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use vigil_core::{Spawn, StaticSpawn};

use crate::publisher::{AllVisible, ViewFilter};

/// Number of movers in [`Scenario::default`], matching the reference world.
pub const REFERENCE_MOVERS: usize = 999;

// ── ExecutionMode ──────────────────────────────────────────────────

/// How the generate and next phases are executed across entities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One entity after another on the tick thread.
    Sequential,
    /// Data-parallel on the rayon pool. Results are committed in the
    /// same order as in sequential mode.
    #[default]
    Parallel,
}

// ── Scenario ───────────────────────────────────────────────────────

/// Initial contents of the world.
///
/// Live entities are instantiated first, in order, then statics; all draw
/// ids from the same allocator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scenario {
    /// Initial live entities.
    pub spawns: Vec<Spawn>,
    /// Static entities, serialized once at initialization.
    pub statics: Vec<StaticSpawn>,
}

impl Scenario {
    /// An empty world.
    pub fn empty() -> Self {
        Self::default()
    }

    /// One spawner at the origin followed by `movers` movers at `(1, y)`
    /// for `y` in `1..=movers`, each starting forward.
    pub fn reference(movers: usize) -> Self {
        let mut spawns = Vec::with_capacity(movers + 1);
        spawns.push(Spawn::spawner("World", 0, 0));
        for i in 1..=movers {
            let y = i32::try_from(i).unwrap_or(i32::MAX);
            spawns.push(Spawn::mover("Mover", 1, y, true));
        }
        Self {
            spawns,
            statics: Vec::new(),
        }
    }

    /// Builder: append a live entity.
    pub fn with_spawn(mut self, spawn: Spawn) -> Self {
        self.spawns.push(spawn);
        self
    }

    /// Builder: append a static entity.
    pub fn with_static(mut self, spawn: StaticSpawn) -> Self {
        self.statics.push(spawn);
        self
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by [`SimConfig::validate()`] or raised by lifecycle
/// misuse of a [`Simulation`](crate::simulation::Simulation).
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// tick_rate_hz is NaN, infinite, zero, negative, or so small its
    /// period is not representable.
    InvalidTickRate {
        /// The invalid value.
        value: f64,
    },
    /// max_sessions is zero.
    ZeroSessions,
    /// `start()` was called on a running simulation.
    AlreadyStarted,
    /// `start()` was called after shutdown.
    AlreadyStopped,
    /// A background thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTickRate { value } => {
                write!(f, "tick_rate_hz must be finite and positive, got {value}")
            }
            Self::ZeroSessions => write!(f, "max_sessions must be at least 1"),
            Self::AlreadyStarted => write!(f, "simulation is already running"),
            Self::AlreadyStopped => write!(f, "simulation has been shut down"),
            Self::ThreadSpawnFailed { reason } => {
                write!(f, "thread spawn failed: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

// ── SimConfig ──────────────────────────────────────────────────────

/// Complete configuration for a simulation.
#[derive(Clone)]
pub struct SimConfig {
    /// Target tick rate. Default: 100 (a 10 ms tick).
    pub tick_rate_hz: f64,
    /// Entity execution mode. Default: [`ExecutionMode::Parallel`].
    pub mode: ExecutionMode,
    /// Upper bound on concurrently registered view workers. Default: 256.
    pub max_sessions: usize,
    /// Initial world. Default: [`Scenario::reference`] with
    /// [`REFERENCE_MOVERS`] movers.
    pub scenario: Scenario,
    /// Visibility hook applied when rendering session documents.
    /// Default: [`AllVisible`].
    pub filter: Arc<dyn ViewFilter>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 100.0,
            mode: ExecutionMode::default(),
            max_sessions: 256,
            scenario: Scenario::reference(REFERENCE_MOVERS),
            filter: Arc::new(AllVisible),
        }
    }
}

impl fmt::Debug for SimConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimConfig")
            .field("tick_rate_hz", &self.tick_rate_hz)
            .field("mode", &self.mode)
            .field("max_sessions", &self.max_sessions)
            .field("spawns", &self.scenario.spawns.len())
            .field("statics", &self.scenario.statics.len())
            .finish_non_exhaustive()
    }
}

impl SimConfig {
    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.tick_rate_hz;
        // 1. Tick rate must be finite and positive with a finite period.
        if !rate.is_finite() || rate <= 0.0 || !(1.0 / rate).is_finite() {
            return Err(ConfigError::InvalidTickRate { value: rate });
        }
        // 2. At least one view worker must be admissible.
        if self.max_sessions == 0 {
            return Err(ConfigError::ZeroSessions);
        }
        Ok(())
    }

    /// Target interval between tick starts.
    ///
    /// Only meaningful after [`validate()`](Self::validate) has passed.
    pub fn tick_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.tick_rate_hz).unwrap_or(Duration::MAX)
    }
}
