//! Test fixtures for Vigil development.
//!
//! Scenario and config builders, raw payload builders, view filters that
//! record or hide what they see, and a polling helper for tests that run
//! a threaded [`Simulation`](vigil_engine::Simulation).

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::thread;
use std::time::{Duration, Instant};

use vigil_core::SessionId;
use vigil_engine::{ExecutionMode, Scenario, SimConfig};

pub use fixtures::{HideKind, PayloadBuilder, RecordingFilter, SlowFilter};

/// Shorthand for a session id.
pub fn session(id: &str) -> SessionId {
    SessionId::from(id)
}

/// A config running `scenario` in `mode` at a fast tick rate.
pub fn config_with(scenario: Scenario, mode: ExecutionMode) -> SimConfig {
    SimConfig {
        tick_rate_hz: 500.0,
        mode,
        scenario,
        ..SimConfig::default()
    }
}

/// Sequential-mode config for deterministic lockstep tests.
pub fn lockstep_config(scenario: Scenario) -> SimConfig {
    config_with(scenario, ExecutionMode::Sequential)
}

/// Poll `cond` every millisecond, panicking after `timeout`.
pub fn wait_until(timeout: Duration, what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}
