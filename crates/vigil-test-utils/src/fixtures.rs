//! Reusable payload builders, view filters and scenarios.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use vigil_core::{EntitySnapshot, SessionId, Spawn, StaticSpawn};
use vigil_engine::{Scenario, ViewFilter};

/// Builds raw action payloads in the wire shape.
///
/// Priority is emitted as a string-encoded integer, the way clients send it.
pub struct PayloadBuilder {
    name: String,
    priority: Option<i64>,
    parameters: Vec<(String, String)>,
}

impl PayloadBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: None,
            parameters: Vec::new(),
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> String {
        let mut payload = json!({ "name": self.name });
        if let Some(p) = self.priority {
            payload["priority"] = Value::String(p.to_string());
        }
        if !self.parameters.is_empty() {
            payload["parameters"] = self
                .parameters
                .into_iter()
                .map(|(name, value)| json!({ "name": name, "value": value }))
                .collect();
        }
        payload.to_string()
    }
}

/// Allows everything, counting how many snapshots each session was
/// asked about.
#[derive(Default)]
pub struct RecordingFilter {
    seen: Mutex<HashMap<SessionId, usize>>,
}

impl RecordingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots checked for `session` so far.
    pub fn seen(&self, session: &SessionId) -> usize {
        self.seen
            .lock()
            .map(|m| m.get(session).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl ViewFilter for RecordingFilter {
    fn visible(&self, session: &SessionId, _snapshot: &EntitySnapshot) -> bool {
        if let Ok(mut seen) = self.seen.lock() {
            *seen.entry(session.clone()).or_default() += 1;
        }
        true
    }
}

/// Allows everything, sleeping `delay` per snapshot so renders take long
/// enough to overlap with other events.
pub struct SlowFilter {
    delay: Duration,
    started: AtomicBool,
}

impl SlowFilter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicBool::new(false),
        }
    }

    /// Whether any render has begun.
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

impl ViewFilter for SlowFilter {
    fn visible(&self, _session: &SessionId, _snapshot: &EntitySnapshot) -> bool {
        self.started.store(true, Ordering::Release);
        thread::sleep(self.delay);
        true
    }
}

/// Hides every snapshot of one kind (by tag, e.g. `"Mover"`).
pub struct HideKind(pub &'static str);

impl ViewFilter for HideKind {
    fn visible(&self, _session: &SessionId, snapshot: &EntitySnapshot) -> bool {
        snapshot.kind_tag() != self.0
    }
}

/// `n` forward movers in one row, two cells apart, starting at x = 0.
pub fn mover_row(n: usize, y: i32) -> Scenario {
    let mut scenario = Scenario::empty();
    for i in 0..n {
        scenario = scenario.with_spawn(Spawn::mover("Mover", 2 * i as i32, y, true));
    }
    scenario
}

/// Two movers on row 0 whose first steps meet at x = 2.
pub fn converging_pair() -> Scenario {
    Scenario::empty()
        .with_spawn(Spawn::mover("left", 1, 0, true))
        .with_spawn(Spawn::mover("right", 3, 0, false))
}

/// A spawner at the origin with an obstacle wall along x = `wall_x`.
pub fn walled_arena(wall_x: i32, height: i32) -> Scenario {
    let mut scenario = Scenario::empty().with_spawn(Spawn::spawner("World", 0, 0));
    for y in -height..=height {
        scenario = scenario.with_static(StaticSpawn::obstacle("wall", wall_x, y));
    }
    scenario
}
